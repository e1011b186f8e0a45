//! Incremental re-parsing support
//!
//! A re-parse after an edit must produce exactly the tree a full parse of
//! the new text would produce. It gets there faster by reusing subtrees of
//! the previous tree wherever the bytes they depend on are unchanged.
//!
//! ```text
//!  old text  "let x = 1 + 2;"        edits: replace 8..9 with "10"
//!            ├──────┤ └┘└──────┤
//!            Old(0..8) Ins(2) Old(9..14)          <- EditMap segments
//!
//!  new text  "let x = 10 + 2;"
//!             reuse     re-lex   reuse (if intact incl. lookahead)
//! ```
//!
//! - [`Edit`] describes one change; a batch is applied in order, each edit
//!   expressed against the text produced by the previous one
//! - [`EditMap`] composes a batch into preserved old segments and inserted
//!   segments, maps new offsets back to old ones and answers whether an old
//!   byte range survived untouched
//! - [`ReuseCursor`] walks the old tree in old coordinates and yields the
//!   nodes that start at a given offset, largest first
//! - [`DirtyRegionTracker`] collects the changed ranges of the new text

use super::error::ParseError;
use super::tree::Node;

/// Represents a change to the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    /// Byte offset where the change starts
    pub offset: usize,
    /// Length of the old text being replaced
    pub old_length: usize,
    /// Length of the new text
    pub new_length: usize,
}

impl Edit {
    /// Create a new edit
    #[inline]
    pub fn new(offset: usize, old_length: usize, new_length: usize) -> Self {
        Self {
            offset,
            old_length,
            new_length,
        }
    }

    /// Create an insertion edit
    #[inline]
    pub fn insert(offset: usize, length: usize) -> Self {
        Self::new(offset, 0, length)
    }

    /// Create a deletion edit
    #[inline]
    pub fn delete(offset: usize, length: usize) -> Self {
        Self::new(offset, length, 0)
    }

    /// Create a replacement edit
    #[inline]
    pub fn replace(offset: usize, old_length: usize, new_length: usize) -> Self {
        Self::new(offset, old_length, new_length)
    }

    /// Calculate the delta (change in length)
    #[inline]
    pub fn delta(&self) -> isize {
        self.new_length as isize - self.old_length as isize
    }

    /// Range replaced by this edit, in the coordinates before the edit
    #[inline]
    pub fn old_range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.old_length
    }

    /// Range of the replacement text, in the coordinates after the edit
    #[inline]
    pub fn new_range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.new_length
    }

    /// Translate a position from old to new coordinates
    #[inline]
    pub fn translate_position(&self, pos: usize) -> usize {
        if pos <= self.offset {
            pos
        } else if pos <= self.offset + self.old_length {
            // Position inside deleted region -> map to end of the replacement
            self.offset + self.new_length
        } else {
            ((pos as isize) + self.delta()) as usize
        }
    }
}

// ============================================================================
// Dirty regions
// ============================================================================

/// A changed region of the new text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRegion {
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
}

impl DirtyRegion {
    /// Create a new dirty region
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Check if a position is within this region
    #[inline]
    pub fn contains(&self, pos: usize) -> bool {
        pos >= self.start && pos < self.end
    }

    /// Check if this region overlaps with another
    #[inline]
    pub fn overlaps(&self, other: &DirtyRegion) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Merge this region with another (they must overlap or be adjacent)
    #[inline]
    pub fn merge(&self, other: &DirtyRegion) -> DirtyRegion {
        DirtyRegion {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Sorted, non-overlapping set of dirty regions
#[derive(Debug, Clone, Default)]
pub struct DirtyRegionTracker {
    regions: Vec<DirtyRegion>,
}

impl DirtyRegionTracker {
    /// Create an empty tracker
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a region as dirty, merging with overlapping or adjacent regions
    pub fn mark_dirty(&mut self, region: DirtyRegion) {
        let mut merged = region;
        let mut insert_at = self.regions.len();
        let mut remove_count = 0;

        for (i, existing) in self.regions.iter().enumerate() {
            if existing.end < merged.start {
                continue;
            } else if existing.start > merged.end {
                insert_at = insert_at.min(i);
                break;
            } else {
                merged = merged.merge(existing);
                insert_at = insert_at.min(i);
                remove_count += 1;
            }
        }

        self.regions.drain(insert_at..insert_at + remove_count);
        self.regions.insert(insert_at, merged);
    }

    /// Check if a position is dirty
    pub fn is_dirty(&self, pos: usize) -> bool {
        self.regions
            .binary_search_by(|r| {
                if r.end <= pos {
                    std::cmp::Ordering::Less
                } else if r.start > pos {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// Check if a range overlaps with any dirty region
    pub fn is_range_dirty(&self, start: usize, end: usize) -> bool {
        self.regions.iter().any(|r| r.start < end && start < r.end)
    }

    /// All dirty regions
    #[inline]
    pub fn regions(&self) -> &[DirtyRegion] {
        &self.regions
    }

    /// Check if there are any dirty regions
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

// ============================================================================
// Edit map
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    /// Bytes `start..start + len` of the old text, unchanged
    Old { start: usize, len: usize },
    /// Bytes that did not exist in the old text
    Inserted { len: usize },
}

impl Segment {
    fn len(&self) -> usize {
        match *self {
            Segment::Old { len, .. } | Segment::Inserted { len } => len,
        }
    }

    /// Bytes `from..to` of this segment (segment-relative)
    fn slice(&self, from: usize, to: usize) -> Segment {
        match *self {
            Segment::Old { start, .. } => Segment::Old {
                start: start + from,
                len: to - from,
            },
            Segment::Inserted { .. } => Segment::Inserted { len: to - from },
        }
    }
}

/// Composition of an edit batch: which bytes of the new text are old bytes
#[derive(Debug, Clone)]
pub struct EditMap {
    segments: Vec<Segment>,
    /// New-text start of each segment
    new_starts: Vec<usize>,
    old_len: usize,
    new_len: usize,
}

impl EditMap {
    /// Compose `edits` over a text of `old_len` bytes
    ///
    /// Fails with [`ParseError::InvalidEdit`] if an edit reaches past the
    /// end of the text it applies to.
    pub fn new(old_len: usize, edits: &[Edit]) -> Result<Self, ParseError> {
        let mut segments = if old_len > 0 {
            vec![Segment::Old {
                start: 0,
                len: old_len,
            }]
        } else {
            Vec::new()
        };
        let mut current_len = old_len;

        for (index, edit) in edits.iter().enumerate() {
            let edit_end = edit.offset.checked_add(edit.old_length).ok_or_else(|| {
                ParseError::InvalidEdit {
                    index,
                    reason: "edit range overflows".to_string(),
                }
            })?;
            if edit_end > current_len {
                return Err(ParseError::InvalidEdit {
                    index,
                    reason: format!(
                        "edit range {}..{} exceeds text length {}",
                        edit.offset, edit_end, current_len
                    ),
                });
            }

            let mut next = Vec::with_capacity(segments.len() + 2);
            let mut placed = false;
            let mut pos = 0;
            for segment in &segments {
                let seg_start = pos;
                let seg_end = pos + segment.len();
                pos = seg_end;
                if seg_start < edit.offset {
                    let keep = seg_end.min(edit.offset) - seg_start;
                    next.push(segment.slice(0, keep));
                }
                if seg_end > edit_end {
                    if !placed {
                        next.push(Segment::Inserted {
                            len: edit.new_length,
                        });
                        placed = true;
                    }
                    let from = seg_start.max(edit_end) - seg_start;
                    next.push(segment.slice(from, segment.len()));
                }
            }
            if !placed {
                next.push(Segment::Inserted {
                    len: edit.new_length,
                });
            }
            segments = normalize(next);
            current_len = current_len - edit.old_length + edit.new_length;
        }

        let mut new_starts = Vec::with_capacity(segments.len());
        let mut pos = 0;
        for segment in &segments {
            new_starts.push(pos);
            pos += segment.len();
        }
        Ok(Self {
            segments,
            new_starts,
            old_len,
            new_len: current_len,
        })
    }

    /// Length of the old text
    #[inline]
    pub fn old_len(&self) -> usize {
        self.old_len
    }

    /// Length of the text after all edits
    #[inline]
    pub fn new_len(&self) -> usize {
        self.new_len
    }

    fn segment_at(&self, pos: usize) -> Option<usize> {
        if pos >= self.new_len {
            return None;
        }
        match self.new_starts.binary_search(&pos) {
            Ok(i) => Some(i),
            Err(i) => i.checked_sub(1),
        }
    }

    /// Old offset of a new offset, if that byte is preserved
    pub fn new_to_old(&self, pos: usize) -> Option<usize> {
        let i = self.segment_at(pos)?;
        match self.segments[i] {
            Segment::Old { start, .. } => Some(start + (pos - self.new_starts[i])),
            Segment::Inserted { .. } => None,
        }
    }

    /// True if old bytes `start - 1 .. end + lookahead` are preserved as one run
    ///
    /// The byte before `start` is the left context; for `start == 0` the run
    /// must also begin the new text. Reading end of input counts as one
    /// extra byte, which is only preserved when nothing was appended.
    pub fn is_intact(&self, start: usize, end: usize, lookahead: usize) -> bool {
        self.is_intact_around(start, end, 1, lookahead)
    }

    /// Like [`is_intact`](Self::is_intact) with `lookbehind` bytes of left context
    ///
    /// A `lookbehind` larger than `start` reaches the start of input, which is
    /// preserved only when no bytes were inserted in front of the run.
    pub fn is_intact_around(&self, start: usize, end: usize, lookbehind: usize, lookahead: usize) -> bool {
        let behind = lookbehind.max(1);
        let lo = start.saturating_sub(behind);
        let hi = end + lookahead;
        for (i, segment) in self.segments.iter().enumerate() {
            let Segment::Old { start: seg_start, len } = *segment else {
                continue;
            };
            let seg_end = seg_start + len;
            if seg_start > lo {
                return false;
            }
            if seg_end <= lo {
                continue;
            }
            if behind > start && (i != 0 || seg_start != 0) {
                return false;
            }
            let at_end = seg_end == self.old_len && i + 1 == self.segments.len();
            return hi <= seg_end || (at_end && hi <= seg_end + 1);
        }
        false
    }

    /// Changed ranges of the new text
    pub fn changed_ranges(&self) -> Vec<DirtyRegion> {
        let mut tracker = DirtyRegionTracker::new();
        let mut previous_old_end: Option<usize> = Some(0);
        for (i, segment) in self.segments.iter().enumerate() {
            let new_start = self.new_starts[i];
            match *segment {
                Segment::Inserted { len } => {
                    tracker.mark_dirty(DirtyRegion::new(new_start, new_start + len));
                    previous_old_end = None;
                }
                Segment::Old { start, len } => {
                    if previous_old_end.is_some_and(|end| end != start) {
                        // bytes were deleted here
                        tracker.mark_dirty(DirtyRegion::new(new_start, new_start));
                    }
                    previous_old_end = Some(start + len);
                }
            }
        }
        if previous_old_end.is_some_and(|end| end != self.old_len) {
            tracker.mark_dirty(DirtyRegion::new(self.new_len, self.new_len));
        }
        tracker.regions().to_vec()
    }
}

fn normalize(segments: Vec<Segment>) -> Vec<Segment> {
    let mut result: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments {
        if segment.len() == 0 {
            continue;
        }
        match (result.last_mut(), segment) {
            (Some(Segment::Inserted { len }), Segment::Inserted { len: more }) => *len += more,
            (Some(Segment::Old { start, len }), Segment::Old { start: next, len: more })
                if *start + *len == next =>
            {
                *len += more
            }
            _ => result.push(segment),
        }
    }
    result
}

// ============================================================================
// Reuse cursor
// ============================================================================

struct Frame {
    node: Node,
    start: usize,
    child_index: usize,
    child_start: usize,
}

/// Forward-only walker over the old tree, in old coordinates
pub(crate) struct ReuseCursor {
    frames: Vec<Frame>,
}

impl ReuseCursor {
    pub fn new(root: Node) -> Self {
        Self {
            frames: vec![Frame {
                node: root,
                start: 0,
                child_index: 0,
                child_start: 0,
            }],
        }
    }

    /// Non-empty nodes starting exactly at `pos`, outermost first
    ///
    /// Offsets must be queried in non-decreasing order.
    pub fn nodes_at(&mut self, pos: usize) -> Vec<(Node, usize)> {
        while self.frames.len() > 1 {
            let top = &self.frames[self.frames.len() - 1];
            if top.start <= pos && pos < top.start + top.node.len() {
                break;
            }
            self.frames.pop();
        }
        let root = &self.frames[0];
        if pos >= root.start + root.node.len() {
            return Vec::new();
        }

        loop {
            let Some(top) = self.frames.last_mut() else {
                break;
            };
            let children = top.node.children();
            while top.child_index < children.len()
                && top.child_start + children[top.child_index].len() <= pos
            {
                top.child_start += children[top.child_index].len();
                top.child_index += 1;
            }
            if top.child_index >= children.len() || top.child_start > pos {
                break;
            }
            let child = children[top.child_index].clone();
            let start = top.child_start;
            let is_leaf = child.children().is_empty();
            self.frames.push(Frame {
                node: child,
                start,
                child_index: 0,
                child_start: start,
            });
            if is_leaf {
                break;
            }
        }

        self.frames[1..]
            .iter()
            .filter(|frame| frame.start == pos)
            .map(|frame| (frame.node.clone(), frame.start))
            .collect()
    }
}

/// How much of the previous tree an incremental parse reused
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReuseStats {
    /// Subtrees pushed without re-parsing
    pub reused_nodes: usize,
    /// Bytes covered by reused subtrees
    pub reused_bytes: usize,
    /// Tokens taken from old leaves instead of the lexer
    pub reused_tokens: usize,
    /// Tokens produced by the lexer
    pub lexed_tokens: usize,
}

impl ReuseStats {
    /// Share of the new text covered by reused subtrees
    #[inline]
    pub fn efficiency(&self, text_len: usize) -> f64 {
        if text_len == 0 {
            0.0
        } else {
            self.reused_bytes as f64 / text_len as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_creation() {
        let insert = Edit::insert(5, 3);
        assert_eq!(insert.offset, 5);
        assert_eq!(insert.old_length, 0);
        assert_eq!(insert.new_length, 3);
        assert_eq!(insert.delta(), 3);

        let delete = Edit::delete(5, 3);
        assert_eq!(delete.old_length, 3);
        assert_eq!(delete.new_length, 0);
        assert_eq!(delete.delta(), -3);

        let replace = Edit::replace(5, 3, 4);
        assert_eq!(replace.old_range(), 5..8);
        assert_eq!(replace.new_range(), 5..9);
        assert_eq!(replace.delta(), 1);
    }

    #[test]
    fn test_edit_position_translation() {
        let edit = Edit::insert(5, 3);
        assert_eq!(edit.translate_position(4), 4);
        assert_eq!(edit.translate_position(5), 5);
        assert_eq!(edit.translate_position(6), 9);

        let edit = Edit::delete(5, 3);
        assert_eq!(edit.translate_position(6), 5);
        assert_eq!(edit.translate_position(8), 5);
        assert_eq!(edit.translate_position(9), 6);
    }

    #[test]
    fn test_dirty_region_tracker() {
        let mut tracker = DirtyRegionTracker::new();
        tracker.mark_dirty(DirtyRegion::new(5, 10));
        assert!(tracker.is_dirty(5));
        assert!(!tracker.is_dirty(10));

        tracker.mark_dirty(DirtyRegion::new(8, 15));
        assert_eq!(tracker.regions(), &[DirtyRegion::new(5, 15)]);

        tracker.mark_dirty(DirtyRegion::new(20, 25));
        tracker.mark_dirty(DirtyRegion::new(0, 1));
        assert_eq!(
            tracker.regions(),
            &[
                DirtyRegion::new(0, 1),
                DirtyRegion::new(5, 15),
                DirtyRegion::new(20, 25)
            ]
        );
        assert!(tracker.is_range_dirty(14, 16));
        assert!(!tracker.is_range_dirty(15, 20));
    }

    #[test]
    fn test_edit_map_segments() {
        // "let x = 1 + 2;" -> "let x = 10 + 2;"
        let map = EditMap::new(14, &[Edit::replace(8, 1, 2)]).unwrap();
        assert_eq!(map.new_len(), 15);
        assert_eq!(map.new_to_old(0), Some(0));
        assert_eq!(map.new_to_old(7), Some(7));
        assert_eq!(map.new_to_old(8), None);
        assert_eq!(map.new_to_old(9), None);
        assert_eq!(map.new_to_old(10), Some(9));
        assert_eq!(map.new_to_old(14), Some(13));
        assert_eq!(map.new_to_old(15), None);
        assert_eq!(map.changed_ranges(), vec![DirtyRegion::new(8, 10)]);
    }

    #[test]
    fn test_sequential_edits_compose() {
        // second edit is expressed against the text produced by the first
        let map = EditMap::new(10, &[Edit::insert(2, 3), Edit::delete(0, 1)]).unwrap();
        assert_eq!(map.new_len(), 12);
        assert_eq!(map.new_to_old(0), Some(1));
        assert_eq!(map.new_to_old(1), None);
        assert_eq!(map.new_to_old(4), Some(2));
    }

    #[test]
    fn test_invalid_edit() {
        let result = EditMap::new(4, &[Edit::insert(1, 1), Edit::delete(3, 5)]);
        assert!(matches!(result, Err(ParseError::InvalidEdit { index: 1, .. })));
    }

    #[test]
    fn test_is_intact() {
        // old bytes 8..9 replaced
        let map = EditMap::new(14, &[Edit::replace(8, 1, 2)]).unwrap();
        assert!(map.is_intact(0, 5, 1));
        assert!(map.is_intact(4, 7, 1));
        // lookahead reaches into the edit
        assert!(!map.is_intact(4, 7, 2));
        // left context byte was replaced
        assert!(!map.is_intact(9, 10, 0));
        assert!(map.is_intact(10, 14, 1));
        // a column read reaching back across the edit
        assert!(!map.is_intact_around(10, 14, 3, 1));
        assert!(map.is_intact_around(10, 14, 1, 1));

        // appending text invalidates the end-of-input lookahead
        let appended = EditMap::new(5, &[Edit::insert(5, 1)]).unwrap();
        assert!(appended.is_intact(0, 4, 1));
        assert!(!appended.is_intact(0, 5, 1));

        // inserting at the front invalidates nodes at offset zero
        let prepended = EditMap::new(5, &[Edit::insert(0, 1)]).unwrap();
        assert!(!prepended.is_intact(0, 2, 0));
        assert!(prepended.is_intact(2, 3, 0));
        // a run that looked back to the start of input moved away from it
        assert!(!prepended.is_intact_around(2, 3, 3, 0));
    }

    #[test]
    fn test_deletion_is_reported_as_changed() {
        let map = EditMap::new(10, &[Edit::delete(3, 2)]).unwrap();
        assert_eq!(map.changed_ranges(), vec![DirtyRegion::new(3, 3)]);
    }
}
