//! Launch templates, parsed once into flag/value entries.
//!
//! Both template shapes end up as the same [`CompiledTemplate`]: the legacy
//! single string is split into words at load time and paired up exactly like
//! a structured token list, so assembly and sanitization only exist once.
use crate::error::AssemblyError;
use serde::{Deserialize, Serialize};

/// Piece of an argument expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
}

/// One argument word, e.g. `-Djava.library.path=${natives_directory}`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expr {
    segments: Vec<Segment>,
}

impl Expr {
    pub fn parse(text: &str) -> Result<Self, AssemblyError> {
        let mut segments = Vec::new();
        let mut rest = text;

        while let Some(start) = rest.find("${") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| AssemblyError::MalformedPlaceholder {
                template: text.to_string(),
            })?;
            let name = after[..end].trim();
            if name.is_empty() {
                return Err(AssemblyError::MalformedPlaceholder {
                    template: text.to_string(),
                });
            }
            segments.push(Segment::Placeholder(name.to_string()));
            rest = &after[end + 1..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Whole literal text, if the expression has no placeholders
    pub fn as_literal(&self) -> Option<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(_) => return None,
            }
        }
        Some(out)
    }
}

/// Flag and/or value that are emitted or dropped together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    pub flag: Option<Expr>,
    pub value: Option<Expr>,
}

/// Argument pair as written in version metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentPair {
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl ArgumentPair {
    pub fn new(flag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            flag: Some(flag.into()),
            value: Some(value.into()),
        }
    }

    pub fn flag(flag: impl Into<String>) -> Self {
        Self {
            flag: Some(flag.into()),
            value: None,
        }
    }

    pub fn value(value: impl Into<String>) -> Self {
        Self {
            flag: None,
            value: Some(value.into()),
        }
    }
}

/// Launch template in either supported shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentTemplate {
    /// `--username ${auth_player_name} --version ${version_name} ...`
    Legacy(String),
    /// Ordered flag/expression pairs
    Structured(Vec<ArgumentPair>),
}

impl ArgumentTemplate {
    /// Pair a flat token list (`["--username", "${auth_player_name}", "--demo"]`)
    /// into structured form.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = tokens.into_iter().map(Into::into).collect();
        ArgumentTemplate::Structured(pair_words(words))
    }

    pub fn compile(&self) -> Result<CompiledTemplate, AssemblyError> {
        let (pairs, source) = match self {
            ArgumentTemplate::Legacy(text) => {
                let words = text.split_whitespace().map(str::to_string).collect();
                (pair_words(words), text.clone())
            }
            ArgumentTemplate::Structured(pairs) => {
                let source = pairs
                    .iter()
                    .flat_map(|p| p.flag.iter().chain(p.value.iter()))
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(" ");
                (pairs.clone(), source)
            }
        };

        let mut entries = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let flag = pair.flag.as_deref().map(Expr::parse).transpose()?;
            let value = pair.value.as_deref().map(Expr::parse).transpose()?;
            if flag.is_none() && value.is_none() {
                continue;
            }
            entries.push(TemplateEntry { flag, value });
        }

        Ok(CompiledTemplate { entries, source })
    }
}

fn is_flag(word: &str) -> bool {
    word.starts_with('-') && word.len() > 1
}

/// A flag followed by a non-flag word forms one pair; anything else stands alone.
fn pair_words(words: Vec<String>) -> Vec<ArgumentPair> {
    let mut pairs = Vec::new();
    let mut iter = words.into_iter().filter(|w| !w.is_empty()).peekable();

    while let Some(word) = iter.next() {
        if is_flag(&word) {
            match iter.next_if(|next| !is_flag(next)) {
                Some(value) => pairs.push(ArgumentPair::new(word, value)),
                None => pairs.push(ArgumentPair::flag(word)),
            }
        } else {
            pairs.push(ArgumentPair::value(word));
        }
    }

    pairs
}

/// Parsed template ready for assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    pub entries: Vec<TemplateEntry>,
    source: String,
}

impl CompiledTemplate {
    /// Template text used in error messages
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when some flag or value starts with the literal text `prefix`
    pub fn mentions_literal_prefix(&self, prefix: &str) -> bool {
        self.entries.iter().any(|entry| {
            [&entry.flag, &entry.value].into_iter().flatten().any(|expr| {
                matches!(expr.segments().first(), Some(Segment::Literal(text)) if text.starts_with(prefix))
            })
        })
    }
}
