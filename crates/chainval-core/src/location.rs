//! Locations of values inside a structured argument
//!
//! Rendered as the C expression a caller would write to reach the value,
//! e.g. `VkDescriptorSetLayoutCreateInfo->pBindings[2].binding`.

use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Root(String),
    Field(String),
    Index(usize),
    /// Entering the pointee of a pointer field
    Deref,
    /// Entering an extension chain node of the named type
    Chain(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    segments: Vec<Segment>,
}

impl Location {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Root(name.into())],
        }
    }

    pub fn field(&self, name: impl Into<String>) -> Self {
        self.push(Segment::Field(name.into()))
    }

    pub fn index(&self, i: usize) -> Self {
        self.push(Segment::Index(i))
    }

    pub fn deref(&self) -> Self {
        self.push(Segment::Deref)
    }

    pub fn chain(&self, type_name: impl Into<String>) -> Self {
        self.push(Segment::Chain(type_name.into()))
    }

    fn push(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut after_deref = false;
        for segment in &self.segments {
            match segment {
                Segment::Root(name) => write!(f, "{}", name)?,
                Segment::Field(name) if after_deref => write!(f, "->{}", name)?,
                Segment::Field(name) => write!(f, ".{}", name)?,
                Segment::Index(i) => write!(f, "[{}]", i)?,
                Segment::Deref => {}
                Segment::Chain(name) => write!(f, "->pNext<{}>", name)?,
            }
            after_deref = matches!(segment, Segment::Deref | Segment::Root(_));
        }
        Ok(())
    }
}

impl Serialize for Location {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
