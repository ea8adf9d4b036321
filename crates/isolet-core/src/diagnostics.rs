//! Rendering of engine exceptions into worker diagnostics.

use crate::engine::ScriptException;

/// Render an exception into the stable multi-line diagnostic string.
///
/// With source attribution the format is, one part per line and in this
/// fixed order: `resource:line`, the offending source line, a caret
/// underline spanning the reported column range, then the stack trace or
/// (when none is available) the bare exception message. Without attribution
/// the diagnostic is just the exception message. Every variant ends with a
/// newline.
pub fn render_exception(exception: &ScriptException) -> String {
    let Some(site) = &exception.site else {
        return format!("{}\n", exception.message);
    };

    let mut out = String::new();
    out.push_str(&format!("{}:{}\n", site.resource, site.line));
    out.push_str(&site.source_line);
    out.push('\n');

    let start = site.start_column as usize;
    let end = site.end_column as usize;
    out.push_str(&" ".repeat(start));
    out.push_str(&"^".repeat(end.saturating_sub(start)));
    out.push('\n');

    match site.stack_trace.as_deref() {
        Some(trace) if !trace.is_empty() => {
            out.push_str(trace);
            out.push('\n');
        }
        _ => {
            out.push_str(&exception.message);
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExceptionSite;

    fn site() -> ExceptionSite {
        ExceptionSite {
            resource: "worker.js".into(),
            line: 12,
            start_column: 4,
            end_column: 9,
            source_line: "    badOp();".into(),
            stack_trace: Some("Error: nope\n    at worker.js:12".into()),
        }
    }

    #[test]
    fn test_render_without_site() {
        let report = render_exception(&ScriptException::new("engine gave up"));
        assert_eq!(report, "engine gave up\n");
    }

    #[test]
    fn test_render_with_site() {
        let report = render_exception(&ScriptException::with_site("nope", site()));
        let lines: Vec<&str> = report.lines().collect();

        assert_eq!(lines[0], "worker.js:12");
        assert_eq!(lines[1], "    badOp();");
        assert_eq!(lines[2], "    ^^^^^");
        assert_eq!(lines[3], "Error: nope");
        assert_eq!(lines[4], "    at worker.js:12");
        assert!(report.ends_with('\n'));
    }

    #[test]
    fn test_caret_alignment() {
        let report = render_exception(&ScriptException::with_site("nope", site()));
        let caret_line = report.lines().nth(2).unwrap();

        assert_eq!(caret_line.find('^'), Some(4));
        assert_eq!(caret_line.matches('^').count(), 5);
    }

    #[test]
    fn test_empty_span_renders_no_carets() {
        let mut site = site();
        site.start_column = 6;
        site.end_column = 6;
        let report = render_exception(&ScriptException::with_site("nope", site));

        assert_eq!(report.lines().nth(2).unwrap(), "      ");
    }

    #[test]
    fn test_missing_stack_trace_falls_back_to_message() {
        let mut site = site();
        site.stack_trace = None;
        let report = render_exception(&ScriptException::with_site("nope", site));

        assert_eq!(report.lines().last().unwrap(), "nope");
    }

    #[test]
    fn test_empty_stack_trace_falls_back_to_message() {
        let mut site = site();
        site.stack_trace = Some(String::new());
        let report = render_exception(&ScriptException::with_site("nope", site));

        assert_eq!(report.lines().last().unwrap(), "nope");
    }
}
