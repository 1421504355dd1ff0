//! Call-site identities, activation frames and stack resolution.
//!
//! A [`CallSite`] names where code lives and is shared by every invocation
//! of that code. A [`Frame`] is one activation of a call site on some call
//! stack. The resolver walks frames through the [`StackFrame`] trait only,
//! so any host representation of a stack can be plugged in.

pub mod resolver;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use resolver::{resolve, BoundarySpec};

/// Stable identity of a piece of code
///
/// Two invocations of the same code share this key; invocations of
/// different code never do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSite {
    /// Function name
    pub name: Arc<str>,

    /// Defining module, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<Arc<str>>,

    /// Defining file, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Arc<str>>,

    /// Starting line of the definition (0 when unknown)
    #[serde(default)]
    pub line: u32,
}

impl CallSite {
    /// Call site known only by name
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            module: None,
            file: None,
            line: 0,
        }
    }

    /// Fully qualified call site
    pub fn new(
        name: impl Into<Arc<str>>,
        module: impl Into<Arc<str>>,
        file: impl Into<Arc<str>>,
        line: u32,
    ) -> Self {
        Self {
            name: name.into(),
            module: Some(module.into()),
            file: Some(file.into()),
            line,
        }
    }

    /// `module:name`, or whichever half is known
    pub fn regular_name(&self) -> String {
        match &self.module {
            Some(module) if !self.name.is_empty() => format!("{}:{}", module, self.name),
            Some(module) => module.to_string(),
            None => self.name.to_string(),
        }
    }

    /// `file:line`, when the file is known
    pub fn location(&self) -> Option<String> {
        self.file.as_ref().map(|file| format!("{}:{}", file, self.line))
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.regular_name())
    }
}

/// Builds a [`CallSite`] for the enclosing module, file and line.
///
/// ```
/// let site = callscope::call_site!("parse");
/// assert_eq!(&*site.name, "parse");
/// ```
#[macro_export]
macro_rules! call_site {
    ($name:expr) => {
        $crate::frame::CallSite::new($name, module_path!(), file!(), line!())
    };
}

/// Opaque per-activation token
///
/// Only used for identity while walking a stack; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameToken(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

impl FrameToken {
    /// Allocate a process-unique token
    pub fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// Identifies one execution context (thread or lightweight task)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// What the resolver needs to know about a stack frame
pub trait StackFrame {
    /// Identity of the code this frame executes
    fn call_site(&self) -> &CallSite;

    /// Identity of this activation
    fn token(&self) -> FrameToken;

    /// The calling frame, or `None` at the root of the stack
    fn caller(&self) -> Option<&Self>;
}

/// One activation record on a call stack
#[derive(Debug)]
pub struct Frame {
    site: CallSite,
    token: FrameToken,
    caller: Option<Arc<Frame>>,
}

impl Frame {
    /// A frame at the root of a stack
    pub fn root(site: CallSite) -> Arc<Frame> {
        Arc::new(Self {
            site,
            token: FrameToken::next(),
            caller: None,
        })
    }

    /// A frame called from `caller`
    pub fn called_from(caller: &Arc<Frame>, site: CallSite) -> Arc<Frame> {
        Arc::new(Self {
            site,
            token: FrameToken::next(),
            caller: Some(Arc::clone(caller)),
        })
    }

    /// A frame with an optional caller
    pub fn push(caller: Option<&Arc<Frame>>, site: CallSite) -> Arc<Frame> {
        match caller {
            Some(caller) => Self::called_from(caller, site),
            None => Self::root(site),
        }
    }

    /// Build a stack from root-first call sites and return its leaf
    ///
    /// Returns `None` for an empty iterator.
    pub fn stack<I>(sites: I) -> Option<Arc<Frame>>
    where
        I: IntoIterator<Item = CallSite>,
    {
        sites
            .into_iter()
            .fold(None, |leaf, site| Some(Self::push(leaf.as_ref(), site)))
    }

    pub fn site(&self) -> &CallSite {
        &self.site
    }

    pub fn caller_frame(&self) -> Option<&Arc<Frame>> {
        self.caller.as_ref()
    }

    /// Number of frames from this one to the root, inclusive
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = Some(self);
        while let Some(frame) = cursor {
            depth += 1;
            cursor = frame.caller.as_deref();
        }
        depth
    }
}

impl StackFrame for Frame {
    fn call_site(&self) -> &CallSite {
        &self.site
    }

    fn token(&self) -> FrameToken {
        self.token
    }

    fn caller(&self) -> Option<&Self> {
        self.caller.as_deref()
    }
}
