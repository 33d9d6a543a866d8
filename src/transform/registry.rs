use super::{BuildError, Implementation, InstrumentedType, MethodMatcher, MethodToken};

/// Ordered interception bindings
///
/// Bindings accumulate in registration order and are consulted in reverse: when several
/// matchers claim one method, the latest registration wins. Callers can therefore layer a
/// specific interception over a broad default without unregistering anything.
pub struct MethodRegistry {
    bindings: Vec<Binding>,
}

struct Binding {
    matcher: Box<dyn MethodMatcher>,
    implementation: Box<dyn Implementation>,
}

impl MethodRegistry {
    pub fn new() -> MethodRegistry {
        MethodRegistry { bindings: vec![] }
    }

    pub fn append(
        &mut self,
        matcher: Box<dyn MethodMatcher>,
        implementation: Box<dyn Implementation>,
    ) {
        self.bindings.push(Binding {
            matcher,
            implementation,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Let every registered implementation refine the model, in registration order
    pub fn prepare_instrumented<'g>(
        &self,
        mut instrumented: InstrumentedType<'g>,
    ) -> Result<InstrumentedType<'g>, BuildError> {
        for binding in &self.bindings {
            instrumented = binding.implementation.prepare(instrumented)?;
        }
        Ok(instrumented)
    }

    /// The implementation bound to a method, if any matcher claims it
    pub fn binding_for(&self, method: &MethodToken) -> Option<&dyn Implementation> {
        self.bindings
            .iter()
            .rev()
            .find(|binding| binding.matcher.matches(method))
            .map(|binding| binding.implementation.as_ref())
    }
}

impl Default for MethodRegistry {
    fn default() -> MethodRegistry {
        MethodRegistry::new()
    }
}
