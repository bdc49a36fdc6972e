//! Filename classification: display-name cleanup and tag inference.
//!
//! Classification is driven by an ordered rule table matched against the
//! lowercased file stem. Tags from every matching rule are unioned; the
//! first matching rule's description wins.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::ModelDescriptor;

/// Tags carried by every descriptor regardless of rule matches.
const BASE_TAGS: [&str; 2] = ["llm", "local"];

const GENERIC_DESCRIPTION: &str = "General-purpose model with balanced capabilities";

struct ClassifyRule {
    pattern: &'static str,
    tags: &'static [&'static str],
    description: &'static str,
}

const RULES: [ClassifyRule; 6] = [
    ClassifyRule {
        pattern: r"phi|reasoning|logic|math",
        tags: &["reasoning", "logic", "analytical"],
        description: "Reasoning-focused model tuned for logic and math",
    },
    ClassifyRule {
        pattern: r"code|programming|dev",
        tags: &["code", "technical", "structured"],
        description: "Code-specialized model for programming tasks",
    },
    ClassifyRule {
        pattern: r"chat|instruct|dolphin|assistant",
        tags: &["conversational", "adaptive", "instruct"],
        description: "Conversational model with strong instruction following",
    },
    ClassifyRule {
        pattern: r"creative|art|story|write",
        tags: &["creative", "imaginative", "expressive"],
        description: "Creative model oriented toward writing and storytelling",
    },
    ClassifyRule {
        pattern: r"tiny|mini|small|1b|2b",
        tags: &["efficient", "compact", "responsive"],
        description: "Compact model optimized for speed and efficiency",
    },
    ClassifyRule {
        pattern: r"large|big|13b|30b|70b",
        tags: &["comprehensive", "knowledgeable", "versatile"],
        description: "Large-scale model with broad knowledge coverage",
    },
];

static COMPILED_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|rule| Regex::new(rule.pattern).expect("invalid classify rule pattern"))
        .collect()
});

static EXTENSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(gguf|bin|safetensors)$").unwrap());
static QUANT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.q\d+_\w+").unwrap());
static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-\d+(\.\d+)?b(-|$)").unwrap());
static PRECISION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-(q\d+|fp\d+)(-|$)").unwrap());
static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-_.]+").unwrap());

/// Derive a clean display name from a model filename: strip the extension,
/// quantization markers, size and precision suffixes, then normalize
/// separators to underscores.
pub fn clean_display_name(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_lowercase();

    let name = EXTENSION_RE.replace_all(&stem, "");
    let name = QUANT_RE.replace_all(&name, "");
    let name = SIZE_RE.replace_all(&name, "$2");
    let name = PRECISION_RE.replace_all(&name, "$2");
    let name = SEPARATOR_RE.replace_all(&name, "_");

    name.trim_matches('_').to_string()
}

/// Build a descriptor for a discovered model file.
pub fn classify(filename: &str) -> ModelDescriptor {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_lowercase();

    let mut tags: Vec<String> = BASE_TAGS.iter().map(|t| t.to_string()).collect();
    let mut description: Option<&'static str> = None;

    for (rule, pattern) in RULES.iter().zip(COMPILED_RULES.iter()) {
        if pattern.is_match(&stem) {
            tags.extend(rule.tags.iter().map(|t| t.to_string()));
            description.get_or_insert(rule.description);
        }
    }

    tags.sort();
    tags.dedup();

    ModelDescriptor {
        name: clean_display_name(filename),
        file: filename.to_string(),
        description: description.unwrap_or(GENERIC_DESCRIPTION).to_string(),
        tags,
    }
}
