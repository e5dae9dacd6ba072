//! Fallback cookie store.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;

use crate::error::{ConsentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "lax" => Some(Self::Lax),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// A cookie write, rendered as `name=value; Max-Age=..; Path=..; SameSite=..`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackCookie {
    pub name: String,
    /// Already percent-encoded.
    pub value: String,
    pub max_age_secs: i64,
    pub path: String,
    pub same_site: SameSite,
}

impl FallbackCookie {
    /// A site-wide cookie with `Lax` same-site policy.
    pub fn site_wide(name: &str, value: String, max_age_secs: i64) -> Self {
        Self {
            name: name.to_string(),
            value,
            max_age_secs,
            path: "/".to_string(),
            same_site: SameSite::Lax,
        }
    }

    /// A write that deletes `name`.
    pub fn expired(name: &str) -> Self {
        Self::site_wide(name, String::new(), 0)
    }

    /// Parses a cookie string as written through `document.cookie`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.split(';');
        let pair = parts.next().unwrap_or_default();
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| ConsentError::InvalidCookie(format!("missing '=' in {raw:?}")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ConsentError::InvalidCookie(format!("empty name in {raw:?}")));
        }

        let mut cookie = Self {
            name: name.to_string(),
            value: value.trim().to_string(),
            max_age_secs: i64::MAX,
            path: "/".to_string(),
            same_site: SameSite::Lax,
        };
        for attribute in parts {
            let (key, val) = attribute.split_once('=').unwrap_or((attribute, ""));
            match key.trim().to_ascii_lowercase().as_str() {
                "max-age" => {
                    cookie.max_age_secs = val.trim().parse().map_err(|_| {
                        ConsentError::InvalidCookie(format!("bad max-age {val:?}"))
                    })?;
                }
                "path" => cookie.path = val.trim().to_string(),
                "samesite" => {
                    cookie.same_site = SameSite::parse(val.trim()).ok_or_else(|| {
                        ConsentError::InvalidCookie(format!("bad samesite {val:?}"))
                    })?;
                }
                _ => {}
            }
        }
        Ok(cookie)
    }
}

impl fmt::Display for FallbackCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Max-Age={}; Path={}; SameSite={}",
            self.name,
            self.value,
            self.max_age_secs,
            self.path,
            self.same_site.as_str()
        )
    }
}

/// Cookie store sent with every subsequent page request.
pub trait CookieJar: Send + Sync {
    /// Raw (still percent-encoded) value of `name`.
    fn read_cookie(&self, name: &str) -> Result<Option<String>>;
    fn write_cookie(&self, cookie: &FallbackCookie) -> Result<()>;
}

/// A cookie as held by [`MemoryCookieJar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub value: String,
    pub max_age_secs: i64,
    pub path: String,
    pub same_site: SameSite,
}

/// In-memory cookie jar fed through cookie strings, like `document.cookie`.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<BTreeMap<String, StoredCookie>>,
    disabled: bool,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// A jar that rejects every operation (cookies blocked).
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    /// Applies a raw cookie string. `Max-Age` of zero or less deletes.
    pub fn set_cookie_string(&self, raw: &str) -> Result<()> {
        if self.disabled {
            return Err(ConsentError::StorageUnavailable(
                "cookies are disabled".to_string(),
            ));
        }
        let cookie = FallbackCookie::parse(raw)?;
        let mut cookies = self.cookies.lock();
        if cookie.max_age_secs <= 0 {
            cookies.remove(&cookie.name);
        } else {
            cookies.insert(
                cookie.name,
                StoredCookie {
                    value: cookie.value,
                    max_age_secs: cookie.max_age_secs,
                    path: cookie.path,
                    same_site: cookie.same_site,
                },
            );
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<StoredCookie> {
        self.cookies.lock().get(name).cloned()
    }

    /// The `Cookie` request header the next page load would carry.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .lock()
            .iter()
            .map(|(name, cookie)| format!("{name}={}", cookie.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl CookieJar for MemoryCookieJar {
    fn read_cookie(&self, name: &str) -> Result<Option<String>> {
        if self.disabled {
            return Err(ConsentError::StorageUnavailable(
                "cookies are disabled".to_string(),
            ));
        }
        Ok(self.cookies.lock().get(name).map(|c| c.value.clone()))
    }

    fn write_cookie(&self, cookie: &FallbackCookie) -> Result<()> {
        self.set_cookie_string(&cookie.to_string())
    }
}
