use super::{MethodBody, Step};
use crate::jvm::{ConstantValue, UnqualifiedName};

/// Accumulated body of the `<clinit>` method
///
/// Several contributors add steps over the course of a build. The initializer only becomes a
/// method at emission time, and only if anything was contributed at all.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeInitializer {
    steps: Vec<Step>,
}

impl TypeInitializer {
    pub fn none() -> TypeInitializer {
        TypeInitializer { steps: vec![] }
    }

    pub fn is_defined(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn expand_with(mut self, steps: Vec<Step>) -> TypeInitializer {
        self.steps.extend(steps);
        self
    }

    /// Close the accumulated steps into an emittable body, terminating them with a return
    pub fn into_body(self) -> Option<MethodBody> {
        if self.steps.is_empty() {
            return None;
        }
        let mut steps = self.steps;
        if !matches!(steps.last(), Some(Step::Return)) {
            steps.push(Step::Return);
        }
        Some(MethodBody::Steps(steps))
    }
}

/// Work that must run against the live class after loading
///
/// Class file bytes cannot carry arbitrary runtime values, so anything of that kind is staged
/// here and applied by whoever loads the generated class. Detaching a model drops this.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadedTypeInitializer {
    /// Nothing to do after loading
    NoOp,

    /// Assign a constant to a static field of the loaded class
    SetStaticField {
        field: UnqualifiedName,
        value: ConstantValue,
    },

    /// Run several initializers in order
    Compound(Vec<LoadedTypeInitializer>),
}

impl LoadedTypeInitializer {
    /// Does this initializer do anything at all?
    pub fn is_alive(&self) -> bool {
        match self {
            LoadedTypeInitializer::NoOp => false,
            LoadedTypeInitializer::SetStaticField { .. } => true,
            LoadedTypeInitializer::Compound(initializers) => {
                initializers.iter().any(LoadedTypeInitializer::is_alive)
            }
        }
    }

    /// Compose with a later initializer, flattening compounds as they meet
    pub fn expand_with(self, other: LoadedTypeInitializer) -> LoadedTypeInitializer {
        match (self, other) {
            (LoadedTypeInitializer::NoOp, other) => other,
            (this, LoadedTypeInitializer::NoOp) => this,
            (LoadedTypeInitializer::Compound(mut these), LoadedTypeInitializer::Compound(those)) => {
                these.extend(those);
                LoadedTypeInitializer::Compound(these)
            }
            (LoadedTypeInitializer::Compound(mut these), other) => {
                these.push(other);
                LoadedTypeInitializer::Compound(these)
            }
            (this, LoadedTypeInitializer::Compound(those)) => {
                let mut initializers = vec![this];
                initializers.extend(those);
                LoadedTypeInitializer::Compound(initializers)
            }
            (this, other) => LoadedTypeInitializer::Compound(vec![this, other]),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Name;

    fn set_field(name: &str, value: i32) -> LoadedTypeInitializer {
        LoadedTypeInitializer::SetStaticField {
            field: UnqualifiedName::from_string(String::from(name)).unwrap(),
            value: ConstantValue::Integer(value),
        }
    }

    #[test]
    fn empty_initializer_emits_no_body() {
        assert!(!TypeInitializer::none().is_defined());
        assert_eq!(TypeInitializer::none().into_body(), None);
    }

    #[test]
    fn initializer_bodies_end_in_a_return() {
        let initializer = TypeInitializer::none()
            .expand_with(vec![Step::Push(ConstantValue::Integer(1))])
            .expand_with(vec![Step::Push(ConstantValue::Integer(2))]);
        assert!(initializer.is_defined());

        match initializer.into_body() {
            Some(MethodBody::Steps(steps)) => {
                assert_eq!(steps.last(), Some(&Step::Return));
                assert_eq!(steps.len(), 3);
            }
            other => panic!("expected a concrete body, got {:?}", other),
        }
    }

    #[test]
    fn composition_flattens_compounds() {
        let composed = LoadedTypeInitializer::NoOp
            .expand_with(set_field("A", 1))
            .expand_with(LoadedTypeInitializer::NoOp)
            .expand_with(LoadedTypeInitializer::Compound(vec![
                set_field("B", 2),
                set_field("C", 3),
            ]));

        match &composed {
            LoadedTypeInitializer::Compound(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected a compound initializer, got {:?}", other),
        }
        assert!(composed.is_alive());
        assert!(!LoadedTypeInitializer::Compound(vec![LoadedTypeInitializer::NoOp]).is_alive());
    }
}
