use parking_lot::Mutex;

use crate::utils::{segment_bounds, segment_of};

/// Segment size in effect and the generation it belongs to.
///
/// Every size change starts a new generation. Cache keys embed the
/// generation, so segments grouped under an old size are never served again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLayout {
    pub size: u32,
    pub generation: u64,
}

impl SegmentLayout {
    pub fn segment_of(&self, entity_id: u32) -> u32 {
        segment_of(entity_id, self.size)
    }

    pub fn bounds(&self, segment: u32) -> (u32, u32) {
        segment_bounds(segment, self.size)
    }
}

/// Tracks the layout and detects size changes.
#[derive(Debug)]
pub(crate) struct LayoutTracker {
    layout: Mutex<SegmentLayout>,
}

impl LayoutTracker {
    pub(crate) fn new(size: u32) -> Self {
        LayoutTracker {
            layout: Mutex::new(SegmentLayout {
                size: size.max(1),
                generation: 0,
            }),
        }
    }

    /// Returns the layout for `size`, and whether this call started a new
    /// generation.
    pub(crate) fn observe(&self, size: u32) -> (SegmentLayout, bool) {
        let size = size.max(1);
        let mut layout = self.layout.lock();
        if layout.size == size {
            return (*layout, false);
        }
        layout.size = size;
        layout.generation += 1;
        (*layout, true)
    }

    pub(crate) fn current(&self) -> SegmentLayout {
        *self.layout.lock()
    }
}

/// Identifies one segment of one `(key_group, key, language)` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentKey<'a> {
    pub generation: u64,
    pub key_group: &'a str,
    pub key: &'a str,
    pub language_id: u32,
    pub segment: u32,
}

impl SegmentKey<'_> {
    pub fn cache_key(&self) -> String {
        format!(
            "lp:{}:{}.{}.{}:{}",
            self.generation, self.key_group, self.key, self.language_id, self.segment
        )
    }

    /// Invalidation scopes the segment is registered under.
    pub fn scopes(&self) -> [String; 2] {
        [group_scope(self.key_group), language_scope(self.language_id)]
    }
}

pub(crate) fn group_scope(key_group: &str) -> String {
    format!("group:{key_group}")
}

pub(crate) fn language_scope(language_id: u32) -> String {
    format!("language:{language_id}")
}
