//! Auto-tagging engine - extract tags from memory content.
//!
//! Four regex families (languages, frameworks, design patterns, domains)
//! plus frequency-based keyword extraction. Confidence grows with the number
//! of matching indicators per family, capped per family.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

/// Default confidence floor for keeping a tag.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;
/// Default cap on returned tags.
pub const DEFAULT_MAX_TAGS: usize = 10;

const MIN_KEYWORD_LENGTH: usize = 4;
const TOP_KEYWORDS: usize = 5;

fn compile_family(families: &[(&'static str, &[&str])]) -> Vec<(&'static str, Vec<Regex>)> {
    families
        .iter()
        .map(|(tag, patterns)| {
            let compiled = patterns
                .iter()
                .map(|p| {
                    RegexBuilder::new(p)
                        .case_insensitive(true)
                        .build()
                        .expect("auto-tag indicator compiles")
                })
                .collect();
            (*tag, compiled)
        })
        .collect()
}

static LANGUAGE_PATTERNS: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    compile_family(&[
        (
            "python",
            &[
                r"\bimport\b",
                r"\bdef\b",
                r"\bclass\b",
                r"\basync\b",
                r"\bawait\b",
                r"\.py\b",
                r"\bdjango\b",
                r"\bflask\b",
                r"\bfastapi\b",
            ],
        ),
        (
            "javascript",
            &[
                r"\bconst\b",
                r"\blet\b",
                r"\bvar\b",
                r"\bfunction\b",
                r"=>",
                r"\.js\b",
                r"\.jsx\b",
                r"\bnode\b",
            ],
        ),
        (
            "typescript",
            &[
                r"\binterface\b",
                r"\btype\b",
                r":\s*(string|number|boolean)",
                r"\.ts\b",
                r"\.tsx\b",
            ],
        ),
        ("java", &[r"\bpublic\s+class\b", r"\bprivate\b", r"\bstatic\b", r"\.java\b"]),
        ("go", &[r"\bfunc\b", r"\bpackage\b", r"\.go\b", r"\bgoroutine\b"]),
        ("rust", &[r"\bfn\b", r"\bimpl\b", r"\btrait\b", r"\.rs\b", r"\bcargo\b"]),
    ])
});

static FRAMEWORK_PATTERNS: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    compile_family(&[
        (
            "react",
            &[r"\bReact\b", r"\buseState\b", r"\buseEffect\b", r"\bjsx\b", r"\bcomponent\b"],
        ),
        ("fastapi", &[r"\bFastAPI\b", r"@app\.", r"\bDepends\b", r"\bAPIRouter\b"]),
        ("django", &[r"\bdjango\.", r"\bmodels\.Model\b", r"\bviews\b"]),
        ("express", &[r"\bexpress\(\)", r"\bapp\.get\b", r"\breq\.", r"\bres\."]),
        ("flask", &[r"\bFlask\b", r"@app\.route", r"\brender_template\b"]),
        ("nextjs", &[r"\bNext\.js\b", r"\bgetServerSideProps\b", r"\bgetStaticProps\b"]),
    ])
});

static PATTERN_KEYWORDS: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    compile_family(&[
        (
            "async",
            &[r"\basync\b", r"\bawait\b", r"\bPromise\b", r"\basyncio\b", r"\bcoroutine\b"],
        ),
        ("singleton", &[r"\bsingleton\b", r"\b__instance\b", r"\bgetInstance\b"]),
        ("factory", &[r"\bfactory\b", r"\bcreate\b", r"\bmake\b", r"\bbuilder\b"]),
        ("observer", &[r"\bobserver\b", r"\bsubscribe\b", r"\bnotify\b", r"\bevent\b"]),
    ])
});

static DOMAIN_KEYWORDS: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    compile_family(&[
        (
            "database",
            &[
                r"\bsql\b",
                r"\bquery\b",
                r"\bdatabase\b",
                r"\btable\b",
                r"\bindex\b",
                r"\bpostgres\b",
                r"\bmongo\b",
            ],
        ),
        (
            "api",
            &[
                r"\bendpoint\b",
                r"\brequest\b",
                r"\bresponse\b",
                r"\broute\b",
                r"\bhandler\b",
                r"\brest\b",
                r"\bgraphql\b",
            ],
        ),
        (
            "auth",
            &[r"\blogin\b", r"\bauth\b", r"\btoken\b", r"\bsession\b", r"\bpassword\b", r"\bjwt\b"],
        ),
        (
            "testing",
            &[r"\btest\b", r"\bmock\b", r"\bassert\b", r"\bpytest\b", r"\bjest\b", r"\bunit\b"],
        ),
    ])
});

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z_][a-z0-9_]*\b").expect("word pattern compiles"));

const STOPWORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "been", "be", "have",
    "has", "had", "do", "does", "did", "will", "would", "should", "could", "can", "may", "might",
    "must", "this", "that", "these", "those", "and", "but", "or", "for", "nor", "so", "yet", "to",
    "from", "in", "out", "with", "by", "about",
];

/// Automatic tag extraction from memory content.
pub struct AutoTagger {
    min_confidence: f64,
}

impl Default for AutoTagger {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONFIDENCE)
    }
}

impl AutoTagger {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    /// Extract `(tag, confidence)` pairs from content, highest confidence
    /// first, filtered by the confidence floor and capped at `max_tags`.
    pub fn extract_tags(&self, content: &str, max_tags: usize) -> Vec<(String, f64)> {
        let mut tags: HashMap<String, f64> = HashMap::new();

        // Later families overwrite earlier ones on a name collision, and the
        // keyword extractor overwrites them all.
        detect_family(&LANGUAGE_PATTERNS, content, 0.5, 0.1, 0.9, &mut tags);
        detect_family(&FRAMEWORK_PATTERNS, content, 0.6, 0.15, 0.95, &mut tags);
        detect_family(&PATTERN_KEYWORDS, content, 0.5, 0.15, 0.85, &mut tags);
        detect_family(&DOMAIN_KEYWORDS, content, 0.5, 0.1, 0.8, &mut tags);
        for (keyword, confidence) in extract_keywords(content) {
            tags.insert(keyword, confidence);
        }

        let mut kept: Vec<(String, f64)> = tags
            .into_iter()
            .filter(|(_, confidence)| *confidence >= self.min_confidence)
            .collect();
        // Confidence descending; names break ties so output is deterministic.
        kept.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        kept.truncate(max_tags);
        kept
    }

    /// Expand flat tags into hierarchical families, keeping the flat tags.
    pub fn infer_hierarchical_tags(&self, tags: &[String]) -> Vec<String> {
        fn push(tag: String, seen: &mut HashSet<String>, out: &mut Vec<String>) {
            if seen.insert(tag.clone()) {
                out.push(tag);
            }
        }

        let flat: HashSet<&str> = tags.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let mut hierarchical = Vec::new();

        for tag in tags {
            match tag.as_str() {
                "python" | "javascript" | "typescript" | "java" | "go" | "rust" => {
                    push(format!("language/{tag}"), &mut seen, &mut hierarchical);
                    if flat.contains("async") {
                        push(format!("language/{tag}/async"), &mut seen, &mut hierarchical);
                    }
                    if tag == "python" && flat.contains("decorators") {
                        push("language/python/decorators".to_string(), &mut seen, &mut hierarchical);
                    }
                    if tag == "javascript" && flat.contains("promises") {
                        push(
                            "language/javascript/promises".to_string(),
                            &mut seen,
                            &mut hierarchical,
                        );
                    }
                    if tag == "typescript" && flat.contains("types") {
                        push("language/typescript/types".to_string(), &mut seen, &mut hierarchical);
                    }
                }
                "react" | "fastapi" | "django" | "express" | "flask" | "nextjs" => {
                    push(format!("framework/{tag}"), &mut seen, &mut hierarchical);
                }
                "singleton" | "factory" | "observer" => {
                    push(format!("pattern/{tag}"), &mut seen, &mut hierarchical);
                }
                "async" => {
                    push("pattern/async".to_string(), &mut seen, &mut hierarchical);
                }
                "database" | "api" | "auth" | "testing" => {
                    push(format!("domain/{tag}"), &mut seen, &mut hierarchical);
                }
                _ => {}
            }
            push(tag.clone(), &mut seen, &mut hierarchical);
        }

        hierarchical
    }
}

/// Count matching indicators per family entry and convert to confidence:
/// `min(cap, base + matches * step)`.
fn detect_family(
    family: &[(&'static str, Vec<Regex>)],
    content: &str,
    base: f64,
    step: f64,
    cap: f64,
    out: &mut HashMap<String, f64>,
) {
    for (tag, indicators) in family {
        let matches = indicators.iter().filter(|re| re.is_match(content)).count();
        if matches > 0 {
            let confidence = (base + matches as f64 * step).min(cap);
            out.insert((*tag).to_string(), confidence);
        }
    }
}

/// Top high-frequency words as tags: `min(0.7, 0.4 + (count / total) * 2)`.
fn extract_keywords(content: &str) -> Vec<(String, f64)> {
    let lowered = content.to_lowercase();
    let stopwords: HashSet<&str> = STOPWORDS.iter().copied().collect();

    let words: Vec<&str> = WORD_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| w.len() >= MIN_KEYWORD_LENGTH && !stopwords.contains(w))
        .collect();

    let total = words.len();
    if total == 0 {
        return Vec::new();
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in &words {
        *counts.entry(word).or_insert(0) += 1;
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(TOP_KEYWORDS);

    ranked
        .into_iter()
        .map(|(word, count)| {
            let confidence = (0.4 + (count as f64 / total as f64) * 2.0).min(0.7);
            (word.to_string(), confidence)
        })
        .collect()
}
