//! Frame stack resolution.
//!
//! Turns a leaf frame into a root-first sequence of frames, trimmed by a
//! [`BoundarySpec`]:
//!
//! - *ignored* frames and codes are omitted, but walking continues past them
//! - *upper* frames and codes stop the walk before the matching frame is
//!   included (exclusive)
//! - *top* frames and codes stop the walk after the matching frame is
//!   included (inclusive)
//!
//! Stop rules are honored even for frames that are ignored. Membership
//! tests are hash lookups, so resolution is O(stack depth).

use super::{CallSite, FrameToken, StackFrame};
use std::collections::HashSet;

/// Where stack resolution stops and what it skips
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundarySpec {
    pub ignored_frames: HashSet<FrameToken>,
    pub ignored_codes: HashSet<CallSite>,
    pub upper_frames: HashSet<FrameToken>,
    pub upper_codes: HashSet<CallSite>,
    pub top_frames: HashSet<FrameToken>,
    pub top_codes: HashSet<CallSite>,
}

impl BoundarySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_frame(mut self, token: FrameToken) -> Self {
        self.ignored_frames.insert(token);
        self
    }

    pub fn ignore_code(mut self, site: CallSite) -> Self {
        self.ignored_codes.insert(site);
        self
    }

    /// Stop before a frame with this token (exclusive)
    pub fn upper_frame(mut self, token: FrameToken) -> Self {
        self.upper_frames.insert(token);
        self
    }

    /// Stop before a frame running this code (exclusive)
    pub fn upper_code(mut self, site: CallSite) -> Self {
        self.upper_codes.insert(site);
        self
    }

    /// Stop after a frame with this token (inclusive)
    pub fn top_frame(mut self, token: FrameToken) -> Self {
        self.top_frames.insert(token);
        self
    }

    /// Stop after a frame running this code (inclusive)
    pub fn top_code(mut self, site: CallSite) -> Self {
        self.top_codes.insert(site);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ignored_frames.is_empty()
            && self.ignored_codes.is_empty()
            && self.upper_frames.is_empty()
            && self.upper_codes.is_empty()
            && self.top_frames.is_empty()
            && self.top_codes.is_empty()
    }

    pub fn ignores<F: StackFrame>(&self, frame: &F) -> bool {
        self.ignored_frames.contains(&frame.token())
            || self.ignored_codes.contains(frame.call_site())
    }

    fn stops_before<F: StackFrame>(&self, frame: &F) -> bool {
        self.upper_frames.contains(&frame.token()) || self.upper_codes.contains(frame.call_site())
    }

    fn stops_after<F: StackFrame>(&self, frame: &F) -> bool {
        self.top_frames.contains(&frame.token()) || self.top_codes.contains(frame.call_site())
    }
}

/// Resolve the stack ending at `leaf` into root-first order
///
/// **Public** - hot path for both collectors
///
/// Returns an empty vector when there is no leaf. A boundary that is never
/// reached simply lets the walk run to the natural root.
pub fn resolve<'a, F: StackFrame>(leaf: Option<&'a F>, boundary: &BoundarySpec) -> Vec<&'a F> {
    let mut frames = Vec::new();
    let mut cursor = leaf;

    while let Some(frame) = cursor {
        if boundary.stops_before(frame) {
            break;
        }
        if !boundary.ignores(frame) {
            frames.push(frame);
        }
        if boundary.stops_after(frame) {
            break;
        }
        cursor = frame.caller();
    }

    frames.reverse();
    frames
}
