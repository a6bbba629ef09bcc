//! Domains: the calendar and asset universe a term is evaluated on.

use crate::calendar::TradingCalendar;
use crate::error::{Result, TermError};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Domain a term is evaluated on.
///
/// Identity is by code; two calendar domains with the same code are the same
/// domain regardless of the sessions they carry.
#[derive(Debug, Clone)]
pub enum Domain {
    /// Not bound to a calendar; takes the pipeline's domain when run
    Generic,
    /// Bound to a calendar
    Calendar {
        /// Domain code, e.g. `US_EQUITIES`
        code: String,
        /// Trading sessions
        calendar: TradingCalendar,
    },
}

impl Domain {
    /// Calendar domain.
    pub fn calendar(code: impl Into<String>, calendar: TradingCalendar) -> Self {
        Self::Calendar {
            code: code.into(),
            calendar,
        }
    }

    /// Domain code; `GENERIC` for the generic domain.
    pub fn code(&self) -> &str {
        match self {
            Self::Generic => "GENERIC",
            Self::Calendar { code, .. } => code,
        }
    }

    /// True for [`Domain::Generic`].
    pub const fn is_generic(&self) -> bool {
        matches!(self, Self::Generic)
    }

    /// Trading calendar, if specialised.
    pub const fn trading_calendar(&self) -> Option<&TradingCalendar> {
        match self {
            Self::Generic => None,
            Self::Calendar { calendar, .. } => Some(calendar),
        }
    }

    /// Single specialised domain among `domains`, or generic if there is none.
    pub fn unify<'a, I>(domains: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let mut found: Option<&Self> = None;
        let mut codes: Vec<String> = Vec::new();
        for domain in domains {
            if domain.is_generic() || codes.iter().any(|c| c == domain.code()) {
                continue;
            }
            codes.push(domain.code().to_string());
            if found.is_none() {
                found = Some(domain);
            }
        }
        match codes.len() {
            0 => Ok(Self::Generic),
            1 => Ok(found.cloned().unwrap_or(Self::Generic)),
            _ => Err(TermError::AmbiguousDomain { codes }),
        }
    }
}

impl PartialEq for Domain {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code()
    }
}

impl Eq for Domain {}

impl Hash for Domain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code().hash(state);
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
