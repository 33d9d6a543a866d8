use super::MethodToken;
use crate::jvm::UnqualifiedName;
use std::collections::HashSet;

/// Predicate over method descriptions
///
/// Matchers drive method selection twice: interception bindings pair a matcher with an
/// implementation, and the builder's ignore list is a chain of matchers that shields methods
/// from interception entirely.
pub trait MethodMatcher {
    fn matches(&self, method: &MethodToken) -> bool;
}

/// Matches every method
pub struct MatchAny;

impl MethodMatcher for MatchAny {
    fn matches(&self, _method: &MethodToken) -> bool {
        true
    }
}

/// Matches no method
pub struct MatchNone;

impl MethodMatcher for MatchNone {
    fn matches(&self, _method: &MethodToken) -> bool {
        false
    }
}

/// Matches methods by name, regardless of descriptor
pub struct Named(pub UnqualifiedName);

impl MethodMatcher for Named {
    fn matches(&self, method: &MethodToken) -> bool {
        method.name == self.0
    }
}

/// Matches through an arbitrary predicate
pub struct MatchFn<F>(pub F);

impl<F: Fn(&MethodToken) -> bool> MethodMatcher for MatchFn<F> {
    fn matches(&self, method: &MethodToken) -> bool {
        (self.0)(method)
    }
}

/// Matches compiler-generated methods
///
/// This is the seed of every builder's ignore list: synthetic members and bridge methods are
/// artifacts of compilation, and instrumenting them rarely means what the caller intended.
pub struct SyntheticMethods;

impl MethodMatcher for SyntheticMethods {
    fn matches(&self, method: &MethodToken) -> bool {
        method.is_synthetic() || method.is_bridge()
    }
}

/// Decides which candidate methods an instrumentation may touch
///
/// A candidate is eligible when it is not ignored and is either overridable or declared on
/// the type under construction. A declared method additionally stays eligible despite the
/// ignore chain as long as the original type never predefined its signature: a method the
/// instrumentation itself added can always be instrumented.
pub struct InliningFilter {
    predefined: HashSet<String>,
    instrumented_declared: HashSet<String>,
}

impl InliningFilter {
    pub fn new(predefined: HashSet<String>, instrumented_declared: HashSet<String>) -> InliningFilter {
        InliningFilter {
            predefined,
            instrumented_declared,
        }
    }

    /// Filter for a fresh subclass, where no signature is predefined
    pub fn for_subclass(instrumented_declared: HashSet<String>) -> InliningFilter {
        InliningFilter {
            predefined: HashSet::new(),
            instrumented_declared,
        }
    }

    pub fn requires_instrumentation(
        &self,
        ignored: &[Box<dyn MethodMatcher>],
        method: &MethodToken,
    ) -> bool {
        let signature = method.signature();
        let is_declared = self.instrumented_declared.contains(&signature);
        let is_ignored = ignored.iter().any(|matcher| matcher.matches(method));

        (!is_ignored && (method.is_overridable() || is_declared))
            || (is_declared && !self.predefined.contains(&signature))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{FieldType, MethodAccessFlags, MethodDescriptor, Name};

    fn token(name: &str, access_flags: MethodAccessFlags) -> MethodToken {
        MethodToken::new(
            UnqualifiedName::from_string(String::from(name)).unwrap(),
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::int()),
            },
            access_flags,
        )
    }

    fn ignore_synthetics() -> Vec<Box<dyn MethodMatcher>> {
        vec![Box::new(SyntheticMethods)]
    }

    #[test]
    fn simple_matchers() {
        let value = token("value", MethodAccessFlags::PUBLIC);
        let other = token("other", MethodAccessFlags::PUBLIC);

        assert!(MatchAny.matches(&value));
        assert!(!MatchNone.matches(&value));
        assert!(Named(UnqualifiedName::from_string(String::from("value")).unwrap()).matches(&value));
        assert!(!Named(UnqualifiedName::from_string(String::from("value")).unwrap()).matches(&other));
        assert!(MatchFn(|m: &MethodToken| m.name.as_str().starts_with("val")).matches(&value));

        assert!(SyntheticMethods.matches(&token(
            "access$000",
            MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC,
        )));
        assert!(SyntheticMethods.matches(&token(
            "compareTo",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::BRIDGE,
        )));
        assert!(!SyntheticMethods.matches(&value));
    }

    #[test]
    fn eligibility_of_inherited_candidates() {
        let filter = InliningFilter::for_subclass(HashSet::new());
        let ignored = ignore_synthetics();

        // Overridable and not ignored
        assert!(filter.requires_instrumentation(&ignored, &token("value", MethodAccessFlags::PUBLIC)));

        // Final methods cannot be touched unless declared here
        assert!(!filter.requires_instrumentation(
            &ignored,
            &token("value", MethodAccessFlags::PUBLIC | MethodAccessFlags::FINAL),
        ));

        // The ignore chain shields inherited methods
        assert!(!filter.requires_instrumentation(
            &ignored,
            &token("value", MethodAccessFlags::PUBLIC | MethodAccessFlags::SYNTHETIC),
        ));
    }

    #[test]
    fn eligibility_of_declared_candidates() {
        let declared: HashSet<String> = vec![String::from("value()I"), String::from("helper()I")]
            .into_iter()
            .collect();
        let predefined: HashSet<String> = vec![String::from("value()I")].into_iter().collect();
        let filter = InliningFilter::new(predefined, declared);
        let ignored = ignore_synthetics();

        // Declared methods are eligible even when static
        assert!(filter.requires_instrumentation(
            &ignored,
            &token("value", MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC),
        ));

        // An ignored declared method stays eligible only if its signature is new
        assert!(filter.requires_instrumentation(
            &ignored,
            &token("helper", MethodAccessFlags::PUBLIC | MethodAccessFlags::SYNTHETIC),
        ));
        assert!(!filter.requires_instrumentation(
            &ignored,
            &token("value", MethodAccessFlags::PUBLIC | MethodAccessFlags::SYNTHETIC),
        ));
    }
}
