//! Deep equality diff with full paths.
//!
//! A [`CompareCx`] walks two values side by side and records every divergence
//! as a [`Mismatch`] carrying the path from the comparison root, e.g.
//! `world.units[2].hp`. It never stops at the first mismatch: a single
//! verification run reports everything it found.

use std::fmt::{self, Debug};

use serde::Serialize;

/// One divergence found by a compare-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    /// Dotted path from the comparison root.
    pub path: String,
    /// Human-readable description of the difference.
    pub detail: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.detail)
    }
}

/// Accumulates mismatches while two values are compared.
pub struct CompareCx<'h> {
    path: Vec<String>,
    mismatches: Vec<Mismatch>,
    on_mismatch: Option<Box<dyn FnMut(&Mismatch) + 'h>>,
}

impl<'h> CompareCx<'h> {
    /// Start a comparison whose paths are rooted at `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            path: vec![label.into()],
            mismatches: Vec::new(),
            on_mismatch: None,
        }
    }

    /// Start a comparison that also invokes `handler` for each mismatch as it
    /// is found.
    pub fn with_handler(label: impl Into<String>, handler: impl FnMut(&Mismatch) + 'h) -> Self {
        let mut cx = Self::new(label);
        cx.on_mismatch = Some(Box::new(handler));
        cx
    }

    /// The current path, segments joined with `.` (index segments attach
    /// directly, e.g. `units[3]`).
    pub fn path(&self) -> String {
        let mut out = String::new();
        for seg in &self.path {
            if !out.is_empty() && !seg.starts_with('[') {
                out.push('.');
            }
            out.push_str(seg);
        }
        out
    }

    /// Run `f` with `segment` pushed onto the path.
    pub fn scope<R>(&mut self, segment: impl Into<String>, f: impl FnOnce(&mut Self) -> R) -> R {
        self.path.push(segment.into());
        let out = f(self);
        self.path.pop();
        out
    }

    /// Record a mismatch at the current path.
    pub fn report(&mut self, detail: impl Into<String>) {
        let mismatch = Mismatch {
            path: self.path(),
            detail: detail.into(),
        };
        tracing::debug!(path = %mismatch.path, detail = %mismatch.detail, "compare mismatch");
        if let Some(handler) = self.on_mismatch.as_mut() {
            handler(&mismatch);
        }
        self.mismatches.push(mismatch);
    }

    /// Compare two plain values at the current path.
    pub fn check_value<T: PartialEq + Debug + ?Sized>(&mut self, a: &T, b: &T) {
        if a != b {
            self.report(format!("{a:?} != {b:?}"));
        }
    }

    /// Compare two plain values under a named field.
    pub fn check<T: PartialEq + Debug + ?Sized>(&mut self, field: &str, a: &T, b: &T) {
        if a != b {
            self.scope(field, |cx| cx.report(format!("{a:?} != {b:?}")));
        }
    }

    /// Compare two sequence lengths, reporting a mismatch if they differ.
    /// Returns the length of the common prefix.
    pub fn check_len(&mut self, a: usize, b: usize) -> usize {
        if a != b {
            self.report(format!("length {a} != {b}"));
        }
        a.min(b)
    }

    /// Number of mismatches so far.
    pub fn mismatch_count(&self) -> usize {
        self.mismatches.len()
    }

    /// Consume the context, returning every mismatch found.
    pub fn finish(self) -> Vec<Mismatch> {
        self.mismatches
    }
}

impl Debug for CompareCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompareCx")
            .field("path", &self.path)
            .field("mismatches", &self.mismatches)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_joins_fields_and_indices() {
        let mut cx = CompareCx::new("world");
        cx.scope("units", |cx| {
            cx.scope("[2]", |cx| {
                cx.check("hp", &1, &2);
            });
        });
        let found = cx.finish();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "world.units[2].hp");
        assert_eq!(found[0].detail, "1 != 2");
    }

    #[test]
    fn accumulates_instead_of_stopping() {
        let mut cx = CompareCx::new("root");
        cx.check("a", &1, &2);
        cx.check("b", &"x", &"x");
        cx.check("c", &true, &false);
        assert_eq!(cx.mismatch_count(), 2);
    }

    #[test]
    fn handler_sees_each_mismatch() {
        let mut seen = Vec::new();
        {
            let mut cx = CompareCx::with_handler("root", |m: &Mismatch| seen.push(m.path.clone()));
            cx.check("a", &1, &2);
            cx.check("b", &3, &4);
        }
        assert_eq!(seen, vec!["root.a".to_owned(), "root.b".to_owned()]);
    }

    #[test]
    fn check_len_returns_common_prefix() {
        let mut cx = CompareCx::new("list");
        assert_eq!(cx.check_len(3, 5), 3);
        assert_eq!(cx.finish()[0].detail, "length 3 != 5");
    }

    #[test]
    fn mismatch_serializes_to_json() {
        let m = Mismatch {
            path: "a.b".to_owned(),
            detail: "1 != 2".to_owned(),
        };
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"path":"a.b","detail":"1 != 2"}"#);
    }
}
