use thiserror::Error;

pub const WILDCARD: char = '*';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern '{0}' has no '*' wildcard")]
    MissingWildcard(String),

    #[error("pattern '{pattern}' has {count} '*' wildcards, exactly one is supported")]
    TooManyWildcards { pattern: String, count: usize },

    #[error("time window begins at {begin} but ends earlier at {end}")]
    EmptyWindow { begin: i64, end: i64 },
}

/// A filename rule of the form `prefix*suffix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenamePattern {
    text: String,
    prefix: String,
    suffix: String,
}

impl FilenamePattern {
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        let count = text.matches(WILDCARD).count();
        match count {
            0 => Err(PatternError::MissingWildcard(text.to_string())),
            1 => {
                let (prefix, suffix) = text
                    .split_once(WILDCARD)
                    .ok_or_else(|| PatternError::MissingWildcard(text.to_string()))?;
                Ok(Self {
                    text: text.to_string(),
                    prefix: prefix.to_string(),
                    suffix: suffix.to_string(),
                })
            }
            _ => Err(PatternError::TooManyWildcards {
                pattern: text.to_string(),
                count,
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn matches(&self, file_name: &str) -> bool {
        // the length check keeps prefix and suffix from overlapping
        file_name.len() >= self.prefix.len() + self.suffix.len()
            && file_name.starts_with(&self.prefix)
            && file_name.ends_with(&self.suffix)
    }
}

/// A filename rule bounded by an inclusive `[begin, end]` window of unix seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePattern {
    pub id: i64,
    pub pattern: FilenamePattern,
    pub begin: i64,
    pub end: i64,
}

impl ArchivePattern {
    pub fn new(id: i64, pattern: &str, begin: i64, end: i64) -> Result<Self, PatternError> {
        if begin > end {
            return Err(PatternError::EmptyWindow { begin, end });
        }
        Ok(Self {
            id,
            pattern: FilenamePattern::parse(pattern)?,
            begin,
            end,
        })
    }

    pub fn accepts(&self, file_name: &str, timestamp: i64) -> bool {
        self.pattern.matches(file_name) && self.begin <= timestamp && timestamp <= self.end
    }
}
