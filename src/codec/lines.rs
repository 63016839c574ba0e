//! Line-oriented section scanner shared by both codecs.
//!
//! The input is split into lines once. A header line is a trimmed line that
//! starts and ends with `==`; its inner text is compared case-insensitively
//! against the headers the caller knows. A section runs from the line after
//! its header to the next known header or the end of input.

/// Write a header line in canonical form.
pub fn header_line(name: &str) -> String {
    format!("=== {name} ===")
}

/// Inner text of a header-shaped line, or `None` for ordinary lines.
pub fn header_name(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.len() <= 4 || !trimmed.starts_with("==") || !trimmed.ends_with("==") {
        return None;
    }
    let inner = trimmed.trim_matches('=').trim();
    let inner = inner.strip_suffix(':').unwrap_or(inner).trim_end();
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}

/// Value of a `Label: value` line when the label matches (case-insensitive).
pub fn labelled_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let (key, value) = line.trim().split_once(':')?;
    if key.trim().eq_ignore_ascii_case(label) {
        Some(value.trim())
    } else {
        None
    }
}

/// Join lines and trim the result.
pub fn join_trimmed(lines: &[&str]) -> String {
    lines.join("\n").trim().to_string()
}

#[derive(Debug, Clone, Copy)]
struct SectionSpan {
    header: &'static str,
    /// First body line (the line after the header).
    start: usize,
    /// One past the last body line.
    end: usize,
}

/// Result of scanning a document for a fixed set of headers.
#[derive(Debug)]
pub struct SectionScan<'a> {
    lines: Vec<&'a str>,
    spans: Vec<SectionSpan>,
}

impl<'a> SectionScan<'a> {
    pub fn new(text: &'a str, known_headers: &[&'static str]) -> Self {
        let lines: Vec<&'a str> = text.lines().collect();

        let mut starts: Vec<(usize, &'static str)> = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            if let Some(name) = header_name(line) {
                if let Some(known) = known_headers
                    .iter()
                    .find(|h| h.eq_ignore_ascii_case(name))
                {
                    starts.push((idx, *known));
                }
            }
        }

        let spans = starts
            .iter()
            .enumerate()
            .map(|(i, (idx, header))| SectionSpan {
                header: *header,
                start: idx + 1,
                end: starts.get(i + 1).map(|(next, _)| *next).unwrap_or(lines.len()),
            })
            .collect();

        Self { lines, spans }
    }

    /// Body lines of the first section with this header.
    pub fn section(&self, header: &str) -> Option<&[&'a str]> {
        self.spans
            .iter()
            .find(|span| span.header.eq_ignore_ascii_case(header))
            .map(|span| &self.lines[span.start..span.end])
    }

    /// Trimmed body text of the first section with this header.
    pub fn body(&self, header: &str) -> Option<String> {
        self.section(header).map(join_trimmed)
    }

    /// Lines before the first known header.
    pub fn preamble(&self) -> &[&'a str] {
        let end = self
            .spans
            .first()
            .map(|span| span.start - 1)
            .unwrap_or(self.lines.len());
        &self.lines[..end]
    }

    pub fn has_section(&self, header: &str) -> bool {
        self.section(header).is_some()
    }
}
