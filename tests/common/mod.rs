//! Shared harness: a tiny evaluator over assembled write requests
//!
//! Builds are checked by behavior, not by byte inspection. The harness plays the role of
//! a JVM that loaded the emitted classes: original method bodies are registered as fixed
//! behaviors, write requests are "loaded" on top, and invoking a method walks the same
//! resolution a real runtime would. Instance methods only, which is all the scenarios
//! need.
#![allow(dead_code)]

use classweave::jvm::{
    BinaryName, ConstantValue, FieldType, MethodDescriptor, Name, UnqualifiedName,
};
use classweave::pool::method_signature;
use classweave::transform::{
    BuildError, ClassWriter, Implementation, ImplementationTarget, MethodBody, MethodRecord,
    MethodToken, Step, WriteRequest,
};
use std::cell::RefCell;
use std::collections::HashMap;

pub fn binary(name: &str) -> BinaryName {
    BinaryName::from_string(String::from(name)).unwrap()
}

pub fn unqualified(name: &str) -> UnqualifiedName {
    UnqualifiedName::from_string(String::from(name)).unwrap()
}

/// Descriptor of a no-argument method returning `String`
pub fn string_descriptor() -> MethodDescriptor<BinaryName> {
    MethodDescriptor {
        parameters: vec![],
        return_type: Some(FieldType::object(BinaryName::STRING)),
    }
}

/// Implementation that runs the original body, then appends a constant suffix
///
/// Composition goes through `String.concat`, so this only fits methods returning `String`.
pub struct AppendToOriginal(pub &'static str);

impl Implementation for AppendToOriginal {
    fn appender<'g>(
        &self,
        target: &ImplementationTarget<'g>,
        method: &MethodToken,
    ) -> Result<MethodBody, BuildError> {
        Ok(MethodBody::Steps(vec![
            Step::LoadThis,
            target.invoke_original(method).into_step()?,
            Step::Push(ConstantValue::string(self.0)),
            Step::Invoke {
                owner: BinaryName::STRING,
                name: UnqualifiedName::CONCAT,
                descriptor: MethodDescriptor {
                    parameters: vec![FieldType::object(BinaryName::STRING)],
                    return_type: Some(FieldType::object(BinaryName::STRING)),
                },
            },
            Step::Return,
        ]))
    }
}

/// Class file bytes with a readable header
pub fn class_blob() -> Vec<u8> {
    vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34]
}

/// Class writer that captures every request and synthesizes placeholder bytes
pub struct RecordingWriter {
    pub requests: RefCell<Vec<WriteRequest>>,
}

impl RecordingWriter {
    pub fn new() -> RecordingWriter {
        RecordingWriter {
            requests: RefCell::new(vec![]),
        }
    }

    pub fn last(&self) -> WriteRequest {
        self.requests.borrow().last().cloned().unwrap()
    }
}

impl ClassWriter for RecordingWriter {
    fn write(&self, request: WriteRequest) -> Result<HashMap<BinaryName, Vec<u8>>, BuildError> {
        let mut outputs = HashMap::new();
        for auxiliary in &request.auxiliaries {
            outputs.insert(auxiliary.name.clone(), class_blob());
        }
        outputs.insert(request.name.clone(), class_blob());
        self.requests.borrow_mut().push(request);
        Ok(outputs)
    }
}

/// Values flowing through evaluated method bodies
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Void,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
}

fn constant_to_value(constant: &ConstantValue) -> Value {
    match constant {
        ConstantValue::String(string) => Value::Str(String::from(&**string)),
        ConstantValue::Class(class) => Value::Str(String::from(class.as_str())),
        ConstantValue::Integer(integer) => Value::Int(*integer),
        ConstantValue::Long(long) => Value::Long(*long),
        ConstantValue::Float(float) => Value::Float(*float),
        ConstantValue::Double(double) => Value::Double(*double),
    }
}

enum MethodRuntime {
    /// Body kept as the class file had it; behavior comes from the registry
    Original,

    /// Displaced copy of an original body under a fresh name
    Rebased { original_signature: String },

    /// Freshly generated body
    Steps(Vec<Step>),

    Abstract,
}

struct LoadedType {
    methods: HashMap<String, MethodRuntime>,
}

/// Stand-in for the runtime that would load and run emitted classes
pub struct FakeRuntime {
    /// Behaviors of pre-existing method bodies, keyed by owner and signature
    behaviors: HashMap<(String, String), Value>,

    /// Superclass edges, for both registered and loaded types
    supers: HashMap<String, String>,

    loaded: HashMap<String, LoadedType>,

    /// Original bodies executed and constructors called, in order
    calls: RefCell<Vec<String>>,
}

impl FakeRuntime {
    pub fn new() -> FakeRuntime {
        FakeRuntime {
            behaviors: HashMap::new(),
            supers: HashMap::new(),
            loaded: HashMap::new(),
            calls: RefCell::new(vec![]),
        }
    }

    /// Everything traced so far
    pub fn call_trace(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Declare a pre-existing class and its superclass edge
    pub fn register_class(&mut self, name: &str, super_class: &str) {
        self.supers
            .insert(String::from(name), String::from(super_class));
    }

    /// Declare the behavior of a pre-existing method body
    pub fn register_original(&mut self, owner: &str, signature: &str, value: Value) {
        self.behaviors
            .insert((String::from(owner), String::from(signature)), value);
    }

    /// Load one write request, as a class loader would the emitted class file
    pub fn load(&mut self, request: &WriteRequest) {
        let mut methods = HashMap::new();
        for record in &request.methods {
            match record {
                MethodRecord::Preserve { token } => {
                    methods.insert(token.signature(), MethodRuntime::Original);
                }
                MethodRecord::Implement { token, body } => {
                    let runtime = match body {
                        MethodBody::Abstract => MethodRuntime::Abstract,
                        MethodBody::Steps(steps) => MethodRuntime::Steps(steps.clone()),
                    };
                    methods.insert(token.signature(), runtime);
                }
                MethodRecord::RebasedOriginal { original, rebased } => {
                    methods.insert(
                        rebased.signature(),
                        MethodRuntime::Rebased {
                            original_signature: original.signature(),
                        },
                    );
                }
            }
        }
        let name = String::from(request.name.as_str());
        if let Some(super_class) = &request.super_class {
            self.supers
                .insert(name.clone(), String::from(super_class.as_str()));
        }
        self.loaded.insert(name, LoadedType { methods });
    }

    /// Invoke a method, resolving it the way a runtime would
    pub fn invoke(
        &self,
        type_name: &str,
        signature: &str,
        receiver: Value,
        args: Vec<Value>,
    ) -> Value {
        let mut level = Some(String::from(type_name));
        while let Some(current) = level {
            if let Some(loaded) = self.loaded.get(&current) {
                if let Some(kind) = loaded.methods.get(signature) {
                    return self.run(&current, kind, signature, receiver, args);
                }
            }
            let key = (current.clone(), String::from(signature));
            if self.behaviors.contains_key(&key) {
                return self.behavior(&current, signature);
            }
            level = self.supers.get(&current).cloned();
        }
        panic!("no method {} reachable from {}", signature, type_name);
    }

    fn run(
        &self,
        owner: &str,
        kind: &MethodRuntime,
        signature: &str,
        receiver: Value,
        args: Vec<Value>,
    ) -> Value {
        match kind {
            MethodRuntime::Original => self.behavior(owner, signature),
            MethodRuntime::Rebased { original_signature } => {
                self.behavior(owner, original_signature)
            }
            MethodRuntime::Steps(steps) => self.eval(steps, &receiver, &args),
            MethodRuntime::Abstract => panic!("invoked abstract method {}.{}", owner, signature),
        }
    }

    fn behavior(&self, owner: &str, signature: &str) -> Value {
        match self
            .behaviors
            .get(&(String::from(owner), String::from(signature)))
        {
            Some(value) => {
                self.calls
                    .borrow_mut()
                    .push(format!("{}.{}", owner, signature));
                value.clone()
            }
            None => panic!("no behavior registered for {}.{}", owner, signature),
        }
    }

    fn eval(&self, steps: &[Step], receiver: &Value, args: &[Value]) -> Value {
        let mut stack: Vec<Value> = vec![];
        for step in steps {
            match step {
                Step::LoadThis => stack.push(receiver.clone()),
                Step::LoadArgument(index) => stack.push(args[*index].clone()),
                Step::Push(constant) => stack.push(constant_to_value(constant)),
                Step::PushNull => stack.push(Value::Null),
                Step::CallOriginal {
                    owner,
                    name,
                    descriptor,
                    trailing_null,
                } => {
                    let result = self.call_from_stack(
                        &mut stack,
                        owner,
                        name,
                        descriptor,
                        usize::from(*trailing_null),
                    );
                    if result != Value::Void {
                        stack.push(result);
                    }
                }
                Step::Invoke {
                    owner,
                    name,
                    descriptor,
                } => {
                    let result = self.call_from_stack(&mut stack, owner, name, descriptor, 0);
                    if result != Value::Void {
                        stack.push(result);
                    }
                }
                Step::Return => return stack.pop().unwrap_or(Value::Void),
            }
        }
        Value::Void
    }

    fn call_from_stack(
        &self,
        stack: &mut Vec<Value>,
        owner: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
        placeholder_parameters: usize,
    ) -> Value {
        let real_parameters = descriptor.parameters.len() - placeholder_parameters;
        let mut call_args = Vec::with_capacity(real_parameters);
        for _ in 0..real_parameters {
            call_args.push(stack.pop().unwrap());
        }
        call_args.reverse();
        let callee = stack.pop().unwrap();

        if owner.as_str() == "java/lang/String" && name.as_str() == "concat" {
            return match (callee, call_args.into_iter().next()) {
                (Value::Str(base), Some(Value::Str(suffix))) => Value::Str(base + &suffix),
                other => panic!("String.concat applied to {:?}", other),
            };
        }

        // Constructor calls are traced but produce nothing
        if name == &UnqualifiedName::INIT {
            self.calls.borrow_mut().push(format!(
                "{}.{}",
                owner.as_str(),
                method_signature(name, descriptor),
            ));
            return Value::Void;
        }

        let signature = method_signature(name, descriptor);
        self.invoke(owner.as_str(), &signature, callee, call_args)
    }
}
