//! Synthetic object identifiers for project.pbxproj
//!
//! Xcode names every object with a 24-character hexadecimal identifier. New
//! identifiers are derived from a random UUID: the first twelve characters of
//! its canonical text form, each rendered as its two-digit uppercase
//! hexadecimal code point.

use std::collections::HashSet;
use std::fmt::Write;
use uuid::Uuid;

/// Length of a pbxproj object identifier
pub const ID_LEN: usize = 24;

/// Source of fresh object identifiers
pub trait IdGenerator {
    /// Produce the next candidate identifier
    fn next_id(&mut self) -> String;
}

/// Random identifiers derived from v4 UUIDs
#[derive(Debug, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&mut self) -> String {
        encode_uuid(&Uuid::new_v4())
    }
}

/// Encode the first twelve characters of a UUID's text form
pub fn encode_uuid(uuid: &Uuid) -> String {
    let text = uuid.hyphenated().to_string();
    text.chars()
        .take(ID_LEN / 2)
        .fold(String::with_capacity(ID_LEN), |mut out, c| {
            let _ = write!(out, "{:02X}", u32::from(c));
            out
        })
}

/// Hands out identifiers that are unique within a run and absent from the
/// project text
pub struct IdAllocator<'a, G: IdGenerator> {
    generator: &'a mut G,
    issued: HashSet<String>,
}

impl<'a, G: IdGenerator> IdAllocator<'a, G> {
    pub fn new(generator: &'a mut G) -> Self {
        Self {
            generator,
            issued: HashSet::new(),
        }
    }

    /// Draw identifiers until one is neither issued nor present in `content`
    pub fn allocate(&mut self, content: &str) -> String {
        loop {
            let id = self.generator.next_id();
            if !self.issued.contains(&id) && !content.contains(&id) {
                self.issued.insert(id.clone());
                return id;
            }
            tracing::debug!(id = %id, "Identifier collision, drawing again");
        }
    }

    /// Every identifier handed out so far
    pub fn issued(&self) -> &HashSet<String> {
        &self.issued
    }
}
