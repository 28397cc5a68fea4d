//! Alias Resolver
//!
//! Maps every spelling of a batter seen in a corpus to one canonical identity.
//! Full names seed three indices (last name, initials pair, first initial plus
//! last name); every other spelling resolves through exactly one of them.
//! Several candidates are an ambiguity and are reported, never guessed.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

use crate::canon::PlateAppearanceCanonical;
use crate::error::{PipelineError, PipelineResult};

lazy_static::lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref PLAUSIBLE_FULL_NAME: Regex = Regex::new(r"^\w+[\s\-']+\w+$").unwrap();
}

/// Shape of one raw spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameClass {
    /// "John Miller", "Mary Ann O'Neil"
    Full { first: String, last: String },
    /// "J Miller", "J. Miller"
    AbbreviatedFirst { initial: char, last: String },
    /// "J M", "JM"
    Initials { first: char, last: char },
    /// "Q": initials-only with the second letter missing
    SingleInitial(char),
    /// "Miller"
    LastOnly(String),
    /// Nothing usable
    Unusable,
}

fn clean(raw: &str) -> String {
    WHITESPACE.replace_all(raw.trim(), " ").into_owned()
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Title-case each alphabetic run, keeping hyphens and apostrophes.
pub fn title_case_name(name: &str) -> String {
    clean(name)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(|token| {
            let mut out = String::new();
            let mut run = String::new();
            for c in token.chars() {
                if c == '-' || c == '\'' {
                    out.push_str(&title_case_word(&run));
                    out.push(c);
                    run.clear();
                } else {
                    run.push(c);
                }
            }
            out.push_str(&title_case_word(&run));
            out
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn letters_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphabetic()).collect()
}

fn first_letter(s: &str) -> Option<char> {
    s.chars().find(|c| c.is_ascii_alphabetic()).map(|c| c.to_ascii_uppercase())
}

fn is_single_letter(s: &str) -> bool {
    s.chars().count() == 1 && s.chars().all(|c| c.is_ascii_alphabetic())
}

pub fn classify_name(raw: &str) -> NameClass {
    let simple = clean(raw).replace('.', " ");
    let parts: Vec<&str> = simple.split_whitespace().collect();

    match parts.as_slice() {
        [] => NameClass::Unusable,
        [one] => {
            if one.len() == 2 && one.chars().all(|c| c.is_ascii_alphabetic()) {
                let mut chars = one.chars().map(|c| c.to_ascii_uppercase());
                match (chars.next(), chars.next()) {
                    (Some(first), Some(last)) => NameClass::Initials { first, last },
                    _ => NameClass::Unusable,
                }
            } else if is_single_letter(one) {
                first_letter(one).map_or(NameClass::Unusable, NameClass::SingleInitial)
            } else if one.chars().filter(|c| c.is_ascii_alphabetic()).count() >= 2 {
                NameClass::LastOnly(one.to_string())
            } else {
                NameClass::Unusable
            }
        }
        [a, b] if is_single_letter(a) && is_single_letter(b) => match (first_letter(a), first_letter(b)) {
            (Some(first), Some(last)) => NameClass::Initials { first, last },
            _ => NameClass::Unusable,
        },
        [first, .., last] if is_single_letter(first) && letters_only(last).len() >= 2 => {
            match first_letter(first) {
                Some(initial) => NameClass::AbbreviatedFirst {
                    initial,
                    last: last.to_string(),
                },
                None => NameClass::Unusable,
            }
        }
        [first, .., last] => NameClass::Full {
            first: first.to_string(),
            last: last.to_string(),
        },
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliasResolution {
    /// Normalized spelling to canonical identity
    pub map: BTreeMap<String, String>,
    /// Ambiguities and rejected explicit aliases
    pub errors: Vec<String>,
    /// Spellings that map to nothing
    pub unresolved: Vec<String>,
}

impl AliasResolution {
    /// Report lines, prefixed for the batch error list.
    pub fn problems(&self) -> Vec<String> {
        let mut out: Vec<String> = self.errors.iter().map(|e| format!("[alias] {}", e)).collect();
        if !self.unresolved.is_empty() {
            out.push(format!("[alias] Unresolved names: {}", self.unresolved.join(", ")));
        }
        out
    }

    /// Strict-mode gate: any ambiguity, rejected alias or unresolved spelling
    /// fails with the full listing.
    pub fn require_resolved(&self) -> PipelineResult<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Ambiguity(problems))
        }
    }

    /// Canonical identity for a raw spelling, if one was resolved.
    pub fn resolve(&self, raw: &str) -> Option<&str> {
        self.map.get(&title_case_name(raw)).map(String::as_str)
    }
}

#[derive(Default)]
struct FullNameIndex {
    by_last: BTreeMap<String, BTreeSet<String>>,
    by_initials: BTreeMap<(char, char), BTreeSet<String>>,
    by_first_initial_last: BTreeMap<(char, String), BTreeSet<String>>,
    canonical: BTreeSet<String>,
}

impl FullNameIndex {
    fn add(&mut self, first: &str, last: &str) {
        let canonical = title_case_name(&format!("{} {}", first, last));
        let last_upper = letters_only(last).to_ascii_uppercase();
        if let (Some(fi), Some(li)) = (first_letter(first), first_letter(last)) {
            self.by_initials.entry((fi, li)).or_default().insert(canonical.clone());
            self.by_first_initial_last
                .entry((fi, last_upper.clone()))
                .or_default()
                .insert(canonical.clone());
        }
        self.by_last.entry(last_upper).or_default().insert(canonical.clone());
        self.canonical.insert(canonical);
    }
}

enum Lookup {
    One(String),
    None,
    Many(Vec<String>),
}

fn lookup<K: Ord>(index: &BTreeMap<K, BTreeSet<String>>, key: &K) -> Lookup {
    match index.get(key) {
        Some(set) if set.len() == 1 => set.iter().next().cloned().map_or(Lookup::None, Lookup::One),
        Some(set) if set.len() > 1 => Lookup::Many(set.iter().cloned().collect()),
        _ => Lookup::None,
    }
}

/// Build the alias map for a corpus of raw batter spellings. Explicit
/// aliases apply first and always win.
pub fn build_alias_map<'a>(
    names: impl IntoIterator<Item = &'a str>,
    explicit: &BTreeMap<String, String>,
) -> AliasResolution {
    let unique: BTreeSet<String> = names
        .into_iter()
        .map(clean)
        .filter(|n| !n.is_empty())
        .collect();
    let classes: Vec<(String, NameClass)> = unique
        .iter()
        .map(|n| (title_case_name(n), classify_name(n)))
        .collect();

    let mut index = FullNameIndex::default();
    for (_, class) in &classes {
        if let NameClass::Full { first, last } = class {
            index.add(first, last);
        }
    }

    let mut resolution = AliasResolution::default();

    for (from, to) in explicit {
        let from = title_case_name(from);
        let target = title_case_name(to);
        if !index.canonical.contains(&target) && !PLAUSIBLE_FULL_NAME.is_match(&target) {
            resolution
                .errors
                .push(format!("Alias target not a known full name: {} -> {}", from, to));
        }
        resolution.map.insert(from, target);
    }

    for (key, class) in &classes {
        if resolution.map.contains_key(key) {
            continue;
        }
        let (found, label) = match class {
            NameClass::Full { first, last } => {
                resolution
                    .map
                    .insert(key.clone(), title_case_name(&format!("{} {}", first, last)));
                continue;
            }
            NameClass::LastOnly(last) => (
                lookup(&index.by_last, &letters_only(last).to_ascii_uppercase())
                    .or_short(|| title_case_name(last)),
                "last name",
            ),
            NameClass::Initials { first, last } => (
                lookup(&index.by_initials, &(*first, *last)).or_short(|| format!("{} {}", first, last)),
                "initials",
            ),
            NameClass::AbbreviatedFirst { initial, last } => (
                lookup(
                    &index.by_first_initial_last,
                    &(*initial, letters_only(last).to_ascii_uppercase()),
                )
                .or_short(|| format!("{} {}", initial, title_case_name(last))),
                "name",
            ),
            // One letter cannot key any index
            NameClass::SingleInitial(initial) => (Ok(initial.to_string()), "initial"),
            NameClass::Unusable => continue,
        };

        match found {
            Ok(canonical) => {
                resolution.map.insert(key.clone(), canonical);
            }
            Err(candidates) => resolution.errors.push(format!(
                "Ambiguous {} '{}': {}",
                label,
                key,
                candidates.join(", ")
            )),
        }
    }

    resolution.unresolved = classes
        .iter()
        .map(|(key, _)| key)
        .filter(|key| !resolution.map.contains_key(*key))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    resolution
}

impl Lookup {
    /// One candidate, or the deterministic short form when there are none.
    fn or_short(self, short: impl FnOnce() -> String) -> Result<String, Vec<String>> {
        match self {
            Lookup::One(c) => Ok(c),
            Lookup::None => Ok(short()),
            Lookup::Many(cands) => Err(cands),
        }
    }
}

/// Rewrite batters to their canonical identity. Spellings without a mapping
/// (ambiguous, unusable) are left exactly as they were.
pub fn apply_aliases(records: &mut [PlateAppearanceCanonical], resolution: &AliasResolution) {
    for pa in records.iter_mut() {
        if let Some(batter) = pa.batter.as_deref() {
            if let Some(canonical) = resolution.resolve(batter) {
                pa.batter = Some(canonical.to_string());
            }
        }
    }
}
