//! Publication names and URL segments.
//!
//! Names double as file names (`<name>.vrd`), directory names and the
//! marker text of configuration blocks, so they are restricted to a small
//! ASCII alphabet. Human-readable infobase names are slugified into that
//! alphabet, transliterating Cyrillic along the way.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{PublishError, PublishResult};

const URL_RESERVED: &str = "\"'<>#?%`\\/";
const QUOTED_VALUE_RESERVED: &[char] = &['"', '\\', '\n', '\r'];

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicationName(String);

impl PublicationName {
    /// Validates a name supplied verbatim by the caller.
    pub fn parse(raw: &str) -> PublishResult<Self> {
        let invalid = |reason: &str| PublishError::InvalidName {
            name: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(invalid("name cannot be empty"));
        }
        if raw.starts_with('.') {
            return Err(invalid("name cannot start with '.'"));
        }
        if let Some(ch) = raw
            .chars()
            .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')))
        {
            return Err(invalid(&format!("character '{ch}' is not allowed")));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PublicationName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single validated URL path segment, not yet rooted under the url-base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationUrl(String);

impl PublicationUrl {
    pub fn segment(&self) -> &str {
        &self.0
    }

    /// Joins the segment onto `url_base`.
    pub fn rooted(&self, url_base: &str) -> String {
        urlpath_join(url_base, &self.0)
    }
}

impl fmt::Display for PublicationUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives a publication name from an arbitrary human-readable name.
pub fn normalize_name(raw: &str) -> PublishResult<PublicationName> {
    let slug = slugify(raw);
    if slug.is_empty() {
        return Err(PublishError::InvalidName {
            name: raw.to_string(),
            reason: "nothing usable remains after transliteration".to_string(),
        });
    }
    PublicationName::parse(&slug)
}

pub fn validate_url(segment: &str) -> PublishResult<PublicationUrl> {
    let invalid = |reason: String| PublishError::InvalidUrl {
        url: segment.to_string(),
        reason,
    };

    if segment.is_empty() {
        return Err(invalid("url cannot be empty".to_string()));
    }
    if segment == "." || segment == ".." || segment.contains("..") {
        return Err(invalid("relative segments are not allowed".to_string()));
    }
    if let Some(ch) = segment
        .chars()
        .find(|ch| ch.is_whitespace() || ch.is_control() || URL_RESERVED.contains(*ch))
    {
        let reason = if ch == '/' || ch == '\\' {
            "url must be a single path segment".to_string()
        } else {
            format!("character {ch:?} is not allowed")
        };
        return Err(invalid(reason));
    }

    Ok(PublicationUrl(segment.to_string()))
}

/// Strips `url_base` and surrounding slashes from a user-supplied url so
/// `/1c/foo`, `/foo` and `foo` all name the segment `foo`.
pub fn url_segment<'a>(url_base: &str, url: &'a str) -> &'a str {
    let prefix = url_base.trim_end_matches('/');
    let relative = if prefix.is_empty() {
        url
    } else {
        url.strip_prefix(prefix)
            .filter(|rest| rest.starts_with('/'))
            .unwrap_or(url)
    };
    relative.trim_matches('/')
}

pub fn urlpath_join(prefix: &str, url_path: &str) -> String {
    let prefix = format!("{}/", prefix.trim_end_matches('/'));
    if url_path.starts_with(&prefix) {
        return url_path.to_string();
    }
    let url_path = url_path.trim_start_matches('/');
    if url_path.is_empty() {
        prefix[..prefix.len() - 1].to_string()
    } else {
        format!("{prefix}{url_path}")
    }
}

/// Rejects values that cannot sit inside a double-quoted server directive.
pub fn check_config_value(field: &str, value: &str) -> PublishResult<()> {
    if value.is_empty() {
        return Err(PublishError::InvalidPath {
            field: field.to_string(),
            value: value.to_string(),
            reason: "value cannot be empty".to_string(),
        });
    }
    if let Some(ch) = value.chars().find(|ch| QUOTED_VALUE_RESERVED.contains(ch)) {
        return Err(PublishError::InvalidPath {
            field: field.to_string(),
            value: value.to_string(),
            reason: format!("character {ch:?} cannot appear in a quoted directive"),
        });
    }
    Ok(())
}

pub fn slugify(value: &str) -> String {
    static STRIP: OnceLock<Regex> = OnceLock::new();
    static COLLAPSE: OnceLock<Regex> = OnceLock::new();
    let strip = STRIP.get_or_init(|| Regex::new(r"[^a-z0-9_\s-]").expect("valid regex"));
    let collapse = COLLAPSE.get_or_init(|| Regex::new(r"[-\s]+").expect("valid regex"));

    let mut latin = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii() {
            latin.push(ch);
        } else if ch.is_whitespace() {
            latin.push(' ');
        } else {
            latin.push_str(transliterate(ch));
        }
    }
    let lowered = latin.to_ascii_lowercase();
    let stripped = strip.replace_all(&lowered, "");
    let collapsed = collapse.replace_all(&stripped, "-");
    collapsed.trim_matches(|ch| ch == '-' || ch == '_').to_string()
}

fn transliterate(ch: char) -> &'static str {
    let lower = ch.to_lowercase().next().unwrap_or(ch);
    match lower {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' | 'ё' | 'э' | 'є' => "e",
        'ж' => "zh",
        'з' => "z",
        'и' | 'і' => "i",
        'й' => "j",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "h",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "sch",
        'ы' => "y",
        'ю' => "ju",
        'я' => "ja",
        'ї' => "ji",
        'ґ' => "g",
        'ъ' | 'ь' => "",
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' => "a",
        'æ' => "ae",
        'ç' | 'č' | 'ć' => "c",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' | 'ń' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'ß' => "ss",
        'š' | 'ś' => "s",
        'ž' | 'ź' | 'ż' => "z",
        'ł' => "l",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_transliterates_cyrillic() {
        assert_eq!(slugify("Бухгалтерия 2345"), "buhgalterija-2345");
        assert_eq!(slugify("Тест"), "test");
        assert_eq!(slugify("Зарплата и Кадры"), "zarplata-i-kadry");
    }

    #[test]
    fn slugify_strips_punctuation() {
        assert_eq!(slugify("true & false"), "true-false");
        assert_eq!(slugify("  -Trade_  "), "trade");
        assert_eq!(slugify("Café Déjà"), "cafe-deja");
    }

    #[test]
    fn normalize_rejects_empty_result() {
        let err = normalize_name("!!!").unwrap_err();
        assert!(matches!(err, PublishError::InvalidName { .. }));
        let err = normalize_name("ъь").unwrap_err();
        assert!(matches!(err, PublishError::InvalidName { .. }));
    }

    #[test]
    fn explicit_names_are_restricted() {
        assert!(PublicationName::parse("acc-2024_v1.2").is_ok());
        assert!(PublicationName::parse("").is_err());
        assert!(PublicationName::parse(".hidden").is_err());
        assert!(PublicationName::parse("a/b").is_err());
        assert!(PublicationName::parse("a b").is_err());
        assert!(PublicationName::parse("тест").is_err());
    }

    #[test]
    fn urls_must_be_single_safe_segments() {
        assert_eq!(validate_url("hello-world").unwrap().segment(), "hello-world");
        for bad in ["", "..", "a..b", "a/b", "a\\b", "a b", "a\"b", "a<b", "a#b", "a?b"] {
            let err = validate_url(bad).unwrap_err();
            assert!(matches!(err, PublishError::InvalidUrl { .. }), "{bad}");
        }
    }

    #[test]
    fn urlpath_join_cases() {
        let cases = [
            ("/base", "path", "/base/path"),
            ("/base", "/path", "/base/path"),
            ("/base/", "path", "/base/path"),
            ("/base/", "/path", "/base/path"),
            ("/base/", "/base/path", "/base/path"),
            ("/base", "", "/base"),
        ];
        for (prefix, path, expected) in cases {
            assert_eq!(urlpath_join(prefix, path), expected, "{prefix} + {path}");
        }
    }

    #[test]
    fn url_segment_strips_base() {
        assert_eq!(url_segment("/1c", "/1c/foo"), "foo");
        assert_eq!(url_segment("/1c/", "/foo/"), "foo");
        assert_eq!(url_segment("/1c", "foo"), "foo");
        assert_eq!(url_segment("/1c", "/1cfoo"), "1cfoo");
        assert_eq!(url_segment("/1c", "/1c/a/b"), "a/b");
    }

    #[test]
    fn quoted_values_reject_quotes_and_newlines() {
        assert!(check_config_value("file", "/srv/ib/acc").is_ok());
        assert!(check_config_value("file", "/srv/\"ib").is_err());
        assert!(check_config_value("file", "/srv/ib\nAlias").is_err());
        assert!(check_config_value("file", "").is_err());
    }
}
