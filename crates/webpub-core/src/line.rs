/// One physical line of configuration text. `start..end` covers the line
/// including its terminator, so slicing the source by consecutive records
/// reproduces it exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRecord<'a> {
    pub text: &'a str,
    pub number: usize,
    pub start: usize,
    pub end: usize,
}

pub fn split_lines(input: &str) -> Vec<LineRecord<'_>> {
    let mut lines = Vec::new();
    let mut offset = 0usize;

    for (index, raw) in input.split_inclusive('\n').enumerate() {
        let mut text = raw;
        if let Some(stripped) = text.strip_suffix('\n') {
            text = stripped.strip_suffix('\r').unwrap_or(stripped);
        }

        lines.push(LineRecord {
            text,
            number: index + 1,
            start: offset,
            end: offset + raw.len(),
        });

        offset += raw.len();
    }

    lines
}
