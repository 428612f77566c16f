//! Compiler-generated member names
//!
//! Generated members are named `<outer>k__rest`, where `k` says what kind of
//! member it is. Only lifted local functions are safe to patch by name; the
//! others carry hidden state or depend on their enclosing method's layout.

/// Kind of a generated member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratedKind {
    /// `g__`: lifted local function
    LocalFunction,
    /// `b__`: lambda body
    Lambda,
    /// `d__`: iterator or state machine
    StateMachine,
    /// `k__`: backing member
    BackingMember,
    /// Any other generated name
    Other,
}

impl GeneratedKind {
    /// Whether members of this kind may be matched and patched
    #[inline]
    #[must_use]
    pub const fn is_patchable(self) -> bool {
        matches!(self, Self::LocalFunction)
    }
}

/// Classify a member name; `None` means the name was written by a person
#[must_use]
pub fn classify(name: &str) -> Option<GeneratedKind> {
    if !name.starts_with('<') {
        return None;
    }
    let tail = name.find('>').map_or("", |i| &name[i + 1..]);
    let kind = match tail.split_once("__").map(|(kind, _)| kind) {
        Some("g") => GeneratedKind::LocalFunction,
        Some("b") => GeneratedKind::Lambda,
        Some("d") => GeneratedKind::StateMachine,
        Some("k") => GeneratedKind::BackingMember,
        _ => GeneratedKind::Other,
    };
    Some(kind)
}

/// Whether a member with this name takes part in matching
#[must_use]
pub fn is_matchable(name: &str) -> bool {
    classify(name).map_or(true, GeneratedKind::is_patchable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(classify("speed"), None);
        assert_eq!(classify("<speed>g__bonus|0"), Some(GeneratedKind::LocalFunction));
        assert_eq!(classify("<Main>b__0_1"), Some(GeneratedKind::Lambda));
        assert_eq!(classify("<Walk>d__4"), Some(GeneratedKind::StateMachine));
        assert_eq!(classify("<Name>k__BackingField"), Some(GeneratedKind::BackingMember));
        assert_eq!(classify("<>c"), Some(GeneratedKind::Other));
    }

    #[test]
    fn only_local_functions_are_matchable() {
        assert!(is_matchable("speed"));
        assert!(is_matchable("<speed>g__bonus|0"));
        assert!(!is_matchable("<Main>b__0_1"));
        assert!(!is_matchable("<Walk>d__4"));
        assert!(!is_matchable("<Name>k__BackingField"));
        assert!(!is_matchable("<>c"));
    }
}
