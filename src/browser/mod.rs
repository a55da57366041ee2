// (C) Coralbits SL 2025
// This file is part of PDF Generator and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

mod chromium;
mod filter;
mod idle;
mod traits;
mod types;

pub use chromium::*;
pub use filter::*;
pub use idle::*;
pub use traits::*;
pub use types::*;
