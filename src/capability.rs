//! Capability broker: decides what host abilities are exposed into a
//! sandbox. The granted surface is always the same minimal set (a captured
//! console, the injected stdin value, the language's pure computation
//! intrinsics); everything here is about making the denials explicit and
//! enforceable inside the runtime.

use serde::Serialize;

use crate::runner::Language;

/// A host ability that is never granted to sandboxed code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    FileSystem,
    Network,
    ProcessControl,
    Environment,
    ModuleLoading,
}

impl Capability {
    pub const DENIED: [Capability; 5] = [
        Capability::FileSystem,
        Capability::Network,
        Capability::ProcessControl,
        Capability::Environment,
        Capability::ModuleLoading,
    ];

    /// Global identifiers the harness must trap for this capability in the
    /// given language. Touching one of them terminates the run as a
    /// capability violation.
    pub fn identifiers(&self, language: Language) -> &'static [&'static str] {
        match language {
            Language::JavaScript => match self {
                Capability::FileSystem => &["fs"],
                Capability::Network => &["fetch", "XMLHttpRequest", "WebSocket"],
                Capability::ProcessControl => &["process", "child_process"],
                Capability::Environment => &["process"],
                Capability::ModuleLoading => &["require", "module", "exports"],
            },
            Language::Python => match self {
                Capability::FileSystem => &["open"],
                Capability::Network => &[],
                Capability::ProcessControl => &["exit", "quit", "breakpoint"],
                Capability::Environment => &[],
                Capability::ModuleLoading => &["__import__"],
            },
        }
    }
}

/// The explicit abilities exposed to one sandboxed execution.
///
/// Built fresh per request and serialized into the harness config; never
/// shared between invocations.
#[derive(Debug, Clone)]
pub struct CapabilitySet {
    pub language: Language,
    /// Value surfaced to the snippet as its stdin equivalent
    pub stdin: String,
    pub denied: Vec<Capability>,
}

impl CapabilitySet {
    pub fn for_language(language: Language, stdin: Option<&str>) -> Self {
        Self {
            language,
            stdin: stdin.unwrap_or_default().to_string(),
            denied: Capability::DENIED.to_vec(),
        }
    }

    /// All trapped identifiers for this set, deduplicated, in a stable order.
    pub fn denied_identifiers(&self) -> Vec<&'static str> {
        let mut identifiers = Vec::new();
        for capability in &self.denied {
            for name in capability.identifiers(self.language) {
                if !identifiers.contains(name) {
                    identifiers.push(*name);
                }
            }
        }
        identifiers
    }
}
