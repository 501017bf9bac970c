use glob::{glob_with, MatchOptions, Pattern};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, PartialEq)]
pub enum Error {
    InvalidPattern(String),
    Glob(String),
}

impl std::error::Error for Error {}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidPattern(msg) => write!(f, "Invalid asset pattern: {}", msg),
            Error::Glob(msg) => write!(f, "Unable to list the assets: {}", msg),
        }
    }
}

/// The files of a dist directory that match an asset pattern, relative to the
/// directory itself.
#[derive(Clone, Debug)]
pub struct Assets {
    pub root: PathBuf,
    pub paths: Vec<PathBuf>,
}

/// Expands the `{a,b,c}` groups of `pattern`, since `glob` doesn't.
/// Groups can't be nested.
pub fn expand_braces(pattern: &str) -> Result<Vec<String>, Error> {
    let open = match pattern.find('{') {
        Some(open) => open,
        None => {
            if pattern.contains('}') {
                return Err(Error::InvalidPattern(format!("unmatched }} in {}", pattern)));
            }
            return Ok(vec![String::from(pattern)]);
        }
    };
    let close = match pattern[open..].find('}') {
        Some(close) => open + close,
        None => return Err(Error::InvalidPattern(format!("unmatched {{ in {}", pattern))),
    };
    let group = &pattern[open + 1..close];
    if group.contains('{') {
        return Err(Error::InvalidPattern(format!(
            "nested braces are not supported: {}",
            pattern
        )));
    }

    let (prefix, suffix) = (&pattern[..open], &pattern[close + 1..]);
    let mut ret = vec![];
    for alternative in group.split(',') {
        for rest in expand_braces(suffix)? {
            ret.push(format!("{}{}{}", prefix, alternative, rest));
        }
    }
    Ok(ret)
}

impl Assets {
    pub fn new(root: &Path, pattern: &str) -> Result<Assets, Error> {
        let escaped_root = Pattern::escape(&root.to_string_lossy());
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };

        let mut paths = vec![];
        for expanded in expand_braces(pattern)? {
            let full = format!("{}/{}", escaped_root, expanded.trim_start_matches('/'));
            let entries =
                glob_with(&full, options).map_err(|error| Error::InvalidPattern(error.to_string()))?;
            for entry in entries {
                let path = entry.map_err(|error| Error::Glob(error.to_string()))?;
                if !path.is_file() {
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(root) {
                    paths.push(relative.to_path_buf());
                }
            }
        }
        paths.sort();
        paths.dedup();

        Ok(Assets {
            root: root.to_path_buf(),
            paths,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
