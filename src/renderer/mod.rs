// (C) Coralbits SL 2025
// This file is part of PDF Generator and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

mod scope;
pub mod scripts;
mod workflow;

#[cfg(test)]
pub(crate) mod mock;

pub use scope::*;
pub use workflow::*;
