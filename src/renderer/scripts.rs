// (C) Coralbits SL 2025
// This file is part of PDF Generator and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

//! Stylesheet and scripts evaluated inside the rendered document.

/// Print overrides. Applied with screen media emulated, so no media query.
pub const PRINT_STYLES: &str = r#"
nav, aside, footer,
[role="navigation"], [role="banner"] nav,
.navbar, .nav, .menu, .sidebar, .site-header, .site-footer,
.breadcrumbs, .pagination, .cookie-banner, .chat-widget, .share-buttons,
.modal, .tooltip, .no-print,
button:not(.data-button), .btn:not(.data-button), input, select, textarea {
  display: none !important;
}

.data-button {
  display: inline !important;
  background: none !important;
  border: none !important;
  box-shadow: none !important;
  padding: 0 !important;
  margin: 0 !important;
  color: inherit !important;
  font: inherit !important;
  text-decoration: underline !important;
  cursor: default !important;
}

[data-page-break="before"] { break-before: page !important; page-break-before: always !important; }
[data-page-break="after"] { break-after: page !important; page-break-after: always !important; }
[data-avoid-break], table, figure, tr, img {
  break-inside: avoid !important;
  page-break-inside: avoid !important;
}

.hero, .hero-banner {
  min-height: 0 !important;
  height: auto !important;
  max-height: 320px !important;
  padding: 24px 0 !important;
  overflow: hidden !important;
}
.hero img, .hero-banner img { max-height: 280px !important; object-fit: cover !important; }

.image-grid, .gallery {
  display: grid !important;
  grid-template-columns: repeat(3, 1fr) !important;
  gap: 8px !important;
}
.image-grid img, .gallery img {
  width: 100% !important;
  max-height: 180px !important;
  object-fit: cover !important;
}

table { width: 100% !important; font-size: 11px !important; border-collapse: collapse !important; }
th, td { padding: 4px 6px !important; }

.interactive-map { display: none !important; }
.static-map { display: block !important; max-width: 100% !important; height: auto !important; }

body { margin: 0 !important; }
"#;

/// Appends [`PRINT_STYLES`] to the document head
pub fn inject_styles() -> String {
    format!(
        r#"(() => {{
  const style = document.createElement('style');
  style.setAttribute('data-pdf-generator', 'print');
  style.textContent = {css};
  (document.head || document.documentElement).appendChild(style);
  return true;
}})()"#,
        css = js_string(PRINT_STYLES)
    )
}

/// Shows the pre-rendered static image paired with each interactive map.
/// The pairing is either `data-static-map="<selector>"` on the map or a
/// `.static-map` sibling. The interactive element is hidden in every case.
pub const SWAP_STATIC_MAPS: &str = r#"(() => {
  let swapped = 0;
  document.querySelectorAll('.interactive-map').forEach((map) => {
    const pairedSelector = map.getAttribute('data-static-map');
    let image = pairedSelector ? document.querySelector(pairedSelector) : null;
    if (!image && map.parentElement) {
      image = map.parentElement.querySelector('.static-map');
    }
    if (image) {
      image.style.display = 'block';
      image.style.visibility = 'visible';
      swapped += 1;
    }
    map.style.display = 'none';
  });
  return swapped;
})()"#;

/// Translates `data-page-break` values into CSS break properties
pub const APPLY_PAGE_BREAKS: &str = r#"(() => {
  let applied = 0;
  document.querySelectorAll('[data-page-break]').forEach((el) => {
    const value = (el.getAttribute('data-page-break') || '').trim().toLowerCase();
    if (value === 'before') {
      el.style.breakBefore = 'page';
      el.style.pageBreakBefore = 'always';
      applied += 1;
    } else if (value === 'after') {
      el.style.breakAfter = 'page';
      el.style.pageBreakAfter = 'always';
      applied += 1;
    }
  });
  return applied;
})()"#;

/// Resolves once the document finished loading
pub const WAIT_FOR_LOAD_COMPLETE: &str = r#"new Promise((resolve) => {
  if (document.readyState === 'complete') {
    resolve(true);
    return;
  }
  window.addEventListener('load', () => resolve(true), { once: true });
})"#;

pub fn has_element(selector: &str) -> String {
    format!("document.querySelector({}) !== null", js_string(selector))
}

pub fn has_images_in(selector: &str) -> String {
    format!(
        "(() => {{ const root = document.querySelector({}); return !!root && root.querySelectorAll('img').length > 0; }})()",
        js_string(selector)
    )
}

/// A quoted, escaped JavaScript string literal
fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}
