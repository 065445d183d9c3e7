use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use itertools::Itertools;
use tracing::warn;

use crate::error::IdError;
use crate::ident::collection::IdManager;
use crate::ident::identifier::Identifier;

/// Keywords accepted wherever an identifier is expected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    None,
    All,
    Visible,
    Active,
    Next,
    Prev,
    First,
    Last,
}

impl Keyword {
    /// Resolves the keyword against `manager`. Single-id keywords yield
    /// `vec![None]` when the manager has no such id.
    fn resolve<M: IdManager + ?Sized>(&self, manager: &M) -> Vec<Option<Identifier>> {
        match self {
            Keyword::None => Vec::new(),
            Keyword::All => manager.ids().into_iter().map(Some).collect(),
            Keyword::Visible => manager.visible().into_iter().map(Some).collect(),
            Keyword::Active => {
                let active = manager.active_id();
                if active.is_none() {
                    warn!("no active object");
                }
                vec![active]
            }
            Keyword::Next => vec![manager.next_id()],
            Keyword::Prev => vec![manager.prev_id()],
            Keyword::First => vec![manager.first_id()],
            Keyword::Last => vec![manager.last_id()],
        }
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Keyword::None),
            "ALL" => Ok(Keyword::All),
            "VISIBLE" => Ok(Keyword::Visible),
            "ACTIVE" => Ok(Keyword::Active),
            "NEXT" => Ok(Keyword::Next),
            "PREV" => Ok(Keyword::Prev),
            "FIRST" => Ok(Keyword::First),
            "LAST" => Ok(Keyword::Last),
            _ => Err(()),
        }
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Keyword::None => "NONE",
            Keyword::All => "ALL",
            Keyword::Visible => "VISIBLE",
            Keyword::Active => "ACTIVE",
            Keyword::Next => "NEXT",
            Keyword::Prev => "PREV",
            Keyword::First => "FIRST",
            Keyword::Last => "LAST",
        };
        write!(f, "{}", s)
    }
}

/// A keyword or literal in a position where one identifier is expected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Keyword(Keyword),
    Literal(Identifier),
}

impl Endpoint {
    fn parse(token: &str) -> Result<Self, IdError> {
        match token.parse::<Keyword>() {
            Ok(keyword) => Ok(Endpoint::Keyword(keyword)),
            Err(()) => token.parse::<Identifier>().map(Endpoint::Literal),
        }
    }

    fn resolve_single<M: IdManager + ?Sized>(&self, manager: &M) -> Result<Identifier, IdError> {
        match self {
            Endpoint::Literal(id) => Ok(*id),
            Endpoint::Keyword(keyword) => match keyword.resolve(manager).as_slice() {
                [Some(id)] => Ok(*id),
                _ => Err(IdError::NonSingletonEndpoint { token: keyword.to_string() }),
            },
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Keyword(k) => write!(f, "{}", k),
            Endpoint::Literal(id) => write!(f, "{}", id),
        }
    }
}

/// One token of a selector expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selector {
    Keyword(Keyword),
    Literal(Identifier),
    Range(Endpoint, Endpoint),
}

impl Selector {
    fn parse(token: &str) -> Result<Self, IdError> {
        if let Some((start, stop)) = token.split_once('-') {
            if stop.contains('-') || start.is_empty() || stop.is_empty() {
                return Err(IdError::MalformedRange { token: token.to_string() });
            }
            return Ok(Selector::Range(Endpoint::parse(start)?, Endpoint::parse(stop)?));
        }
        match Endpoint::parse(token)? {
            Endpoint::Keyword(k) => Ok(Selector::Keyword(k)),
            Endpoint::Literal(id) => Ok(Selector::Literal(id)),
        }
    }

    fn resolve<M: IdManager + ?Sized>(
        &self,
        manager: &M,
    ) -> Result<Vec<Option<Identifier>>, IdError> {
        match self {
            Selector::Keyword(k) => Ok(k.resolve(manager)),
            Selector::Literal(id) => Ok(vec![Some(*id)]),
            Selector::Range(start, stop) => {
                let start = start.resolve_single(manager)?;
                let stop = stop.resolve_single(manager)?;
                Ok(manager
                    .ids()
                    .into_iter()
                    .filter(|id| start <= *id && *id <= stop)
                    .map(Some)
                    .collect())
            }
        }
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Keyword(k) => write!(f, "{}", k),
            Selector::Literal(id) => write!(f, "{}", id),
            Selector::Range(a, b) => write!(f, "{}-{}", a, b),
        }
    }
}

/// Result of resolving a selector expression.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Resolved identifiers in expression order, duplicates kept.
    pub ids: Vec<Identifier>,
    /// Identifiers dropped because they are not live, one entry per occurrence.
    pub dropped: Vec<Identifier>,
}

impl Display for Resolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ids.iter().join(", "))
    }
}

/// Splits `text` on commas and whitespace and parses every token.
///
/// A single malformed token rejects the whole expression.
///
/// # Example
///
/// ```rust
/// # use speccore::ident::selector::{parse_selectors, Selector, Keyword};
/// let parsed = parse_selectors("1, 3-5 active").unwrap();
/// assert_eq!(parsed.len(), 3);
/// assert_eq!(parsed[2], Selector::Keyword(Keyword::Active));
/// ```
pub fn parse_selectors(text: &str) -> Result<Vec<Selector>, IdError> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(Selector::parse)
        .collect()
}

/// Resolves a selector expression against `manager`.
///
/// Tokens are evaluated left to right and their results concatenated.
/// Absent ids (e.g. `ACTIVE` with nothing active) are stripped. With
/// `only_existent`, ids that are not live are moved to
/// [`Resolution::dropped`] and a warning is logged for each.
pub fn resolve_ids<M: IdManager + ?Sized>(
    text: &str,
    manager: &M,
    only_existent: bool,
) -> Result<Resolution, IdError> {
    let selectors = parse_selectors(text)?;

    let mut resolved = Vec::new();
    for selector in &selectors {
        resolved.extend(selector.resolve(manager)?);
    }

    let mut resolution = Resolution::default();
    for id in resolved.into_iter().flatten() {
        if only_existent && !manager.contains(&id) {
            warn!(%id, "non-existent id");
            resolution.dropped.push(id);
        } else {
            resolution.ids.push(id);
        }
    }
    Ok(resolution)
}

/// Resolves a selector expression to identifiers, see [`resolve_ids`].
pub fn parse_ids<M: IdManager + ?Sized>(
    text: &str,
    manager: &M,
    only_existent: bool,
) -> Result<Vec<Identifier>, IdError> {
    resolve_ids(text, manager, only_existent).map(|r| r.ids)
}
