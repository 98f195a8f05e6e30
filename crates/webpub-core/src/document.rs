//! Server configuration text as an ordered list of passthrough text and
//! publication blocks.
//!
//! Parsing never normalizes anything: an unmodified document serializes to
//! exactly the text it was parsed from, and every edit only touches the
//! block it targets plus the single blank line that separates a block from
//! the content before it.

use std::collections::HashSet;

use tracing::debug;

use crate::block::{end_marker_name, start_marker_name, ConfigBlock};
use crate::error::{MalformedConfig, PublishError, PublishResult};
use crate::line::split_lines;

/// New blocks go right before this line when it is present.
pub const INSERTION_MARKER: &str = "# --- WEBPUB1C INSERTION POINT";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Passthrough(String),
    Block(ConfigBlock),
}

impl Segment {
    fn text(&self) -> &str {
        match self {
            Segment::Passthrough(text) => text,
            Segment::Block(block) => block.serialize(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    segments: Vec<Segment>,
}

enum ScanState<'a> {
    Passthrough { start: usize },
    InBlock { name: &'a str, start: usize, line: usize },
}

impl ConfigDocument {
    pub fn parse(text: &str) -> Result<Self, MalformedConfig> {
        let mut segments = Vec::new();
        let mut seen = HashSet::new();
        let mut state = ScanState::Passthrough { start: 0 };

        for line in split_lines(text) {
            state = match state {
                ScanState::Passthrough { start } => {
                    if let Some(name) = start_marker_name(line.text) {
                        if name.is_empty() {
                            return Err(MalformedConfig::new(
                                line.number,
                                "publication start marker without a name",
                            ));
                        }
                        if line.start > start {
                            segments.push(Segment::Passthrough(text[start..line.start].to_string()));
                        }
                        ScanState::InBlock {
                            name,
                            start: line.start,
                            line: line.number,
                        }
                    } else if let Some(name) = end_marker_name(line.text) {
                        return Err(MalformedConfig::new(
                            line.number,
                            format!("end marker for '{name}' outside of any publication block"),
                        ));
                    } else {
                        ScanState::Passthrough { start }
                    }
                }
                ScanState::InBlock {
                    name,
                    start,
                    line: opened,
                } => {
                    if start_marker_name(line.text).is_some() {
                        return Err(MalformedConfig::new(
                            line.number,
                            format!("publication block '{name}' opened on line {opened} is not closed before the next one starts"),
                        ));
                    }
                    match end_marker_name(line.text) {
                        None => ScanState::InBlock {
                            name,
                            start,
                            line: opened,
                        },
                        Some(closing) if closing != name => {
                            return Err(MalformedConfig::new(
                                line.number,
                                format!("end marker for '{closing}' closes publication block '{name}'"),
                            ));
                        }
                        Some(_) => {
                            let block = ConfigBlock::parse(&text[start..line.end]).ok_or_else(|| {
                                MalformedConfig::new(
                                    opened,
                                    format!("publication block '{name}' lacks an Alias or ManagedApplicationDescriptor directive"),
                                )
                            })?;
                            if !seen.insert(name) {
                                return Err(MalformedConfig::new(
                                    opened,
                                    format!("publication '{name}' is defined more than once"),
                                ));
                            }
                            segments.push(Segment::Block(block));
                            ScanState::Passthrough { start: line.end }
                        }
                    }
                }
            };
        }

        match state {
            ScanState::InBlock { name, line, .. } => Err(MalformedConfig::new(
                line,
                format!("unterminated publication block '{name}'"),
            )),
            ScanState::Passthrough { start } => {
                if start < text.len() {
                    segments.push(Segment::Passthrough(text[start..].to_string()));
                }
                debug!(blocks = seen.len(), "parsed server config");
                Ok(Self { segments })
            }
        }
    }

    pub fn serialize(&self) -> String {
        self.segments.iter().map(Segment::text).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|segment| segment.text().is_empty())
    }

    pub fn blocks(&self) -> impl Iterator<Item = &ConfigBlock> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Block(block) => Some(block),
            Segment::Passthrough(_) => None,
        })
    }

    /// Text outside of any publication block.
    pub fn passthrough(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Passthrough(text) => Some(text.as_str()),
            Segment::Block(_) => None,
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.blocks().map(ConfigBlock::name).collect()
    }

    pub fn find(&self, name: &str) -> Option<&ConfigBlock> {
        self.blocks().find(|block| block.name() == name)
    }

    /// Name of the publication whose Alias is `url`, ignoring trailing slashes.
    pub fn owner_of_url(&self, url: &str) -> Option<&str> {
        let url = url.trim_end_matches('/');
        self.blocks()
            .find(|block| block.url().trim_end_matches('/') == url)
            .map(ConfigBlock::name)
    }

    /// Replaces the block with the same name in place, or inserts `block` as
    /// a new publication.
    pub fn upsert(&self, block: ConfigBlock) -> PublishResult<ConfigDocument> {
        if let Some(owner) = self.owner_of_url(block.url()) {
            if owner != block.name() {
                return Err(PublishError::DuplicateUrl {
                    url: block.url().to_string(),
                    owner: owner.to_string(),
                });
            }
        }

        let existing = self
            .segments
            .iter()
            .position(|segment| matches!(segment, Segment::Block(current) if current.name() == block.name()));

        let segments = match existing {
            Some(index) => {
                let mut segments = self.segments.clone();
                let needs_newline = index + 1 < segments.len() && !block.serialize().ends_with('\n');
                segments[index] = Segment::Block(block);
                if needs_newline {
                    segments.insert(index + 1, Segment::Passthrough("\n".to_string()));
                }
                segments
            }
            None => self.insert(block),
        };

        Ok(Self::from_segments(segments))
    }

    fn insert(&self, block: ConfigBlock) -> Vec<Segment> {
        let mut head = self.segments.clone();
        let mut tail = Vec::new();

        if let Some((index, offset)) = self.insertion_point() {
            tail = head.split_off(index);
            if let Some(Segment::Passthrough(text)) = tail.first_mut() {
                let before: String = text.drain(..offset).collect();
                if !before.is_empty() {
                    head.push(Segment::Passthrough(before));
                }
            }
        }

        if head.iter().any(|segment| !segment.text().is_empty()) {
            terminate_last_line(&mut head);
            push_text(&mut head, "\n");
        }

        let open_ended = !block.serialize().ends_with('\n');
        head.push(Segment::Block(block));
        if open_ended && !tail.is_empty() {
            head.push(Segment::Passthrough("\n".to_string()));
        }
        head.extend(tail);
        head
    }

    fn insertion_point(&self) -> Option<(usize, usize)> {
        self.segments
            .iter()
            .enumerate()
            .find_map(|(index, segment)| match segment {
                Segment::Passthrough(text) => split_lines(text)
                    .into_iter()
                    .find(|line| line.text.trim_end() == INSERTION_MARKER)
                    .map(|line| (index, line.start)),
                Segment::Block(_) => None,
            })
    }

    /// Drops the named block together with the blank line preceding it.
    /// Removing an absent name returns an unchanged copy.
    pub fn remove(&self, name: &str) -> ConfigDocument {
        let Some(index) = self
            .segments
            .iter()
            .position(|segment| matches!(segment, Segment::Block(block) if block.name() == name))
        else {
            return self.clone();
        };

        let mut segments = self.segments.clone();
        segments.remove(index);

        if index > 0 {
            let follows_block_or_start = index == 1 || matches!(segments[index - 2], Segment::Block(_));
            if let Segment::Passthrough(text) = &mut segments[index - 1] {
                if text.ends_with("\n\n") {
                    text.pop();
                } else if text.as_str() == "\n" && follows_block_or_start {
                    segments.remove(index - 1);
                }
            }
        }

        Self::from_segments(segments)
    }

    /// Appends `line` after the existing content, separated by a blank line.
    pub fn append_line(&self, line: &str) -> ConfigDocument {
        let mut segments = self.segments.clone();
        if !self.is_empty() {
            terminate_last_line(&mut segments);
            push_text(&mut segments, "\n");
        }
        push_text(&mut segments, line);
        if !line.ends_with('\n') {
            push_text(&mut segments, "\n");
        }
        Self::from_segments(segments)
    }

    fn from_segments(segments: Vec<Segment>) -> Self {
        let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
        for segment in segments {
            match segment {
                Segment::Passthrough(text) if text.is_empty() => {}
                Segment::Passthrough(text) => push_text(&mut merged, &text),
                block => merged.push(block),
            }
        }
        Self { segments: merged }
    }
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    match segments.last_mut() {
        Some(Segment::Passthrough(last)) => last.push_str(text),
        _ => segments.push(Segment::Passthrough(text.to_string())),
    }
}

fn terminate_last_line(segments: &mut Vec<Segment>) {
    let unterminated = segments
        .last()
        .is_some_and(|segment| !segment.text().is_empty() && !segment.text().ends_with('\n'));
    if unterminated {
        push_text(segments, "\n");
    }
}
