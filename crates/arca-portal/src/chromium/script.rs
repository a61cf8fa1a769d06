//! Page-side element resolution.
//!
//! Locators are resolved by one script evaluated in the page. It walks the
//! top document and every same-origin frame, matches CSS selectors or ARIA
//! role plus accessible name, and applies a single operation to the match.

use serde::Deserialize;

use crate::error::BrowserError;
use crate::session::Locator;

/// Attribute used to hand a resolved element over to DevTools commands.
pub(crate) const MARK_ATTRIBUTE: &str = "data-arca-target";

/// Operation applied to the resolved element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    /// Existence, visibility and enabled state.
    Probe,
    /// Text of the first match.
    Text,
    /// Text of every match.
    Texts,
    /// Tag the match with [`MARK_ATTRIBUTE`] and scroll it into view.
    Mark,
    /// `element.click()`, regardless of what covers it.
    ForceClick,
    /// Set the value and fire input/change.
    Fill,
}

impl Op {
    /// Whether the operation leaves the page untouched.
    pub(crate) fn is_read_only(&self) -> bool {
        matches!(self, Self::Probe | Self::Text | Self::Texts)
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Probe => "probe",
            Self::Text => "text",
            Self::Texts => "texts",
            Self::Mark => "mark",
            Self::ForceClick => "force_click",
            Self::Fill => "fill",
        }
    }
}

/// Result object returned by the query script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct QueryResult {
    pub found: bool,
    pub visible: bool,
    pub enabled: bool,
    pub top_level: bool,
    pub text: Option<String>,
    pub texts: Vec<String>,
}

const QUERY_FN: &str = r#"(function (locator, op, arg, mark) {
  const norm = (s) => String(s == null ? '' : s).replace(/\s+/g, ' ').trim();
  const lower = (s) => norm(s).toLowerCase();
  const ROLE_SELECTORS = {
    link: 'a[href], [role="link"]',
    button: 'button, input[type="button"], input[type="submit"], input[type="reset"], [role="button"]',
    combobox: '[role="combobox"], select, input[list], input[type="search"], input[type="text"], input:not([type])',
    spinbutton: 'input[type="number"], [role="spinbutton"]',
    textbox: 'input:not([type]), input[type="text"], input[type="email"], input[type="tel"], textarea, [role="textbox"]'
  };

  function documents() {
    const out = [];
    const visit = (doc) => {
      if (!doc) return;
      out.push(doc);
      for (const frame of doc.querySelectorAll('iframe, frame')) {
        let inner = null;
        try { inner = frame.contentDocument; } catch (_) {}
        visit(inner);
      }
    };
    visit(document);
    return out;
  }

  function names(el) {
    const doc = el.ownerDocument;
    const parts = [];
    const aria = el.getAttribute('aria-label');
    if (aria) parts.push(aria);
    const labelledBy = el.getAttribute('aria-labelledby');
    if (labelledBy) {
      for (const id of labelledBy.split(/\s+/)) {
        const ref = doc.getElementById(id);
        if (ref) parts.push(ref.textContent);
      }
    }
    if (el.id) {
      for (const label of doc.querySelectorAll('label[for]')) {
        if (label.getAttribute('for') === el.id) parts.push(label.textContent);
      }
    }
    const wrapping = el.closest('label');
    if (wrapping) parts.push(wrapping.textContent);
    for (const attr of ['title', 'placeholder', 'alt']) {
      const v = el.getAttribute(attr);
      if (v) parts.push(v);
    }
    if (el.tagName === 'INPUT' && /^(button|submit|reset)$/i.test(el.type || '')) parts.push(el.value);
    parts.push(el.innerText || el.textContent);
    return parts.map(lower);
  }

  function byRole(root, role, name) {
    const selector = ROLE_SELECTORS[role];
    if (!selector) return [];
    const wanted = name == null ? null : lower(name);
    return Array.from(root.querySelectorAll(selector))
      .filter((el) => wanted == null || names(el).some((n) => n.includes(wanted)));
  }

  function candidates() {
    const out = [];
    for (const doc of documents()) {
      if (locator.kind === 'css') {
        out.push(...doc.querySelectorAll(locator.selector));
      } else if (locator.kind === 'role') {
        out.push(...byRole(doc, locator.role, locator.name));
      } else if (locator.kind === 'role_in_row') {
        for (const row of doc.querySelectorAll('tr')) {
          const cell = row.querySelector('td, th');
          if (cell && norm(cell.textContent) === norm(locator.row_text)) {
            out.push(...byRole(row, locator.role, locator.name));
          }
        }
      }
    }
    return out;
  }

  function visible(el) {
    const win = el.ownerDocument.defaultView || window;
    const style = win.getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden') return false;
    return el.getClientRects().length > 0;
  }

  function enabled(el) {
    return !el.disabled && el.getAttribute('aria-disabled') !== 'true';
  }

  const all = candidates();
  if (op === 'texts') {
    return { found: all.length > 0, texts: all.map((el) => norm(el.innerText || el.textContent)) };
  }

  const el = all.find(visible) || all[0];
  if (!el) return { found: false };

  const result = {
    found: true,
    visible: visible(el),
    enabled: enabled(el),
    top_level: el.ownerDocument === document
  };

  switch (op) {
    case 'text':
      result.text = norm(el.innerText || el.textContent);
      break;
    case 'mark':
      for (const doc of documents()) {
        for (const old of doc.querySelectorAll('[' + mark + ']')) old.removeAttribute(mark);
      }
      el.setAttribute(mark, arg);
      try { el.scrollIntoView({ block: 'center', inline: 'center' }); } catch (_) {}
      break;
    case 'force_click':
      el.click();
      break;
    case 'fill': {
      const win = el.ownerDocument.defaultView || window;
      try { el.focus(); } catch (_) {}
      const proto = el.tagName === 'TEXTAREA' ? win.HTMLTextAreaElement.prototype : win.HTMLInputElement.prototype;
      const descriptor = Object.getOwnPropertyDescriptor(proto, 'value');
      if (descriptor && descriptor.set) descriptor.set.call(el, arg); else el.value = arg;
      el.dispatchEvent(new win.Event('input', { bubbles: true }));
      el.dispatchEvent(new win.Event('change', { bubbles: true }));
      break;
    }
  }
  return result;
})"#;

/// Build the expression that applies `op` to the element matched by `locator`.
pub(crate) fn query(locator: &Locator, op: Op, arg: &str) -> Result<String, BrowserError> {
    let locator = serde_json::to_string(locator)
        .map_err(|e| BrowserError::Protocol(format!("failed to encode locator: {}", e)))?;
    let op = serde_json::Value::from(op.as_str());
    let arg = serde_json::Value::from(arg);
    let mark = serde_json::Value::from(MARK_ATTRIBUTE);
    Ok(format!("{}({}, {}, {}, {})", QUERY_FN, locator, op, arg, mark))
}

/// CSS selector for an element tagged by [`Op::Mark`] with `token`.
pub(crate) fn marked_selector(token: &str) -> String {
    format!("[{}=\"{}\"]", MARK_ATTRIBUTE, token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    #[test]
    fn test_query_embeds_encoded_arguments() {
        let script = query(&Locator::role(Role::Button, "Continuar"), Op::ForceClick, "").unwrap();
        assert!(script.starts_with("(function (locator, op, arg, mark)"));
        assert!(script.ends_with(
            r#"({"kind":"role","role":"button","name":"Continuar"}, "force_click", "", "data-arca-target")"#
        ));
    }

    #[test]
    fn test_fill_value_is_escaped() {
        let script = query(&Locator::css("#txtAliasCertificado"), Op::Fill, "a\"b\\c").unwrap();
        assert!(script.contains(r#""fill", "a\"b\\c""#));
    }

    #[test]
    fn test_missing_fields_default() {
        let result: QueryResult = serde_json::from_str(r#"{"found":false}"#).unwrap();
        assert_eq!(result, QueryResult::default());

        let result: QueryResult =
            serde_json::from_str(r#"{"found":true,"texts":["CERTIFICADO_A","CERTIFICADO_B"]}"#)
                .unwrap();
        assert!(result.found);
        assert_eq!(result.texts.len(), 2);
    }

    #[test]
    fn test_read_only_ops() {
        assert!(Op::Probe.is_read_only());
        assert!(Op::Texts.is_read_only());
        assert!(!Op::Fill.is_read_only());
        assert!(!Op::Mark.is_read_only());
    }

    #[test]
    fn test_marked_selector() {
        assert_eq!(marked_selector("7"), "[data-arca-target=\"7\"]");
    }
}
