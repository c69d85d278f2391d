//! Harness page rendering

use std::fmt::Write;

/// Render the harness page for one test file.
///
/// ## Parameters
/// - `test_path`: root-relative test path, used for the title and the bundle URL.
/// - `binding`: job-scoped host binding to report through, if the page was opened by the orchestrator.
///
/// ## Notes
/// - The bridge is a no-op when the binding function does not exist, so the page can be opened by hand.
/// - The bridge reports at most once even if QUnit emits `runEnd` again.
pub fn render(test_path: &str, binding: Option<&str>) -> String {
    // A JSON string literal is also a valid JS string literal; `null` keeps the guard path.
    let binding_js = match binding {
        Some(name) => serde_json::Value::from(name).to_string(),
        None => "null".to_string(),
    };
    let title = escape_html(test_path);
    let src = escape_html(&bundle_path(test_path));

    let mut html = String::with_capacity(1024);
    let _ = write!(
        html,
        r#"<!doctype html>
<html>

<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width">
  <title>{title}</title>
  <link rel="icon" href="data:">
  <link rel="stylesheet" href="/qunit.css">
</head>

<body>
  <div id="qunit"></div>
  <div id="qunit-fixture"></div>
  <script src="/qunit.js"></script>
  <script>
    (function (binding) {{
      var report = binding && window[binding];
      if (typeof report !== "function") {{
        return;
      }}
      var sent = false;
      QUnit.on("runEnd", function (runEnd) {{
        if (sent) {{
          return;
        }}
        sent = true;
        report(JSON.stringify(runEnd));
      }});
    }})({binding_js});
  </script>
  <script type="module" src="{src}"></script>
</body>

</html>
"#
    );
    html
}

/// URL path of the harness page for a test.
pub fn test_page_path(test_path: &str) -> String {
    format!("/test/{}", encode_path(test_path))
}

/// URL path of the bundled script for a test.
pub fn bundle_path(test_path: &str) -> String {
    format!("/bundle/{}", encode_path(test_path))
}

/// Percent-encode a `/`-separated path, leaving separators and unreserved characters alone.
pub fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => out.push(byte as char),
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
