//! Hierarchy walks over the pool
//!
//! Everything here is a read-only traversal of resolved hierarchy edges. The walks answer the
//! two questions instrumentation keeps asking: which inherited method does a signature resolve
//! to, and which inherited methods could a generated subtype override at all.

use super::{ClassData, MethodData};
use crate::jvm::{BinaryName, MethodDescriptor, UnqualifiedName};
use std::collections::{HashMap, HashSet};

/// Walk up the superclass chain for a method invocable as a super call
///
/// Private and static declarations do not participate in inheritance, so a match on those is
/// skipped and the walk continues upward.
pub fn locate_super_method<'g>(
    start: &'g ClassData<'g>,
    name: &UnqualifiedName,
    descriptor: &MethodDescriptor<BinaryName>,
) -> Option<&'g MethodData<'g>> {
    let mut next_class = Some(start);
    while let Some(class) = next_class {
        if let Some(method) = class.declared_method(name, descriptor) {
            if !method.is_static() && !method.is_private() {
                return Some(method);
            }
        }
        next_class = class.superclass;
    }
    None
}

/// Nearest overridable implementation of every signature above a class
///
/// The walk starts at the direct superclass, so declarations on the class itself never appear
/// in the table. Keys are signature strings, values the declaration closest to the class.
pub fn super_method_table<'g>(class: &'g ClassData<'g>) -> HashMap<String, &'g MethodData<'g>> {
    let mut table: HashMap<String, &'g MethodData<'g>> = HashMap::new();
    let mut next_class = class.superclass;
    while let Some(ancestor) = next_class {
        for method in ancestor.methods.iter() {
            if method.is_overridable() {
                table.entry(method.signature()).or_insert(method);
            }
        }
        next_class = ancestor.superclass;
    }
    table
}

/// Constructor of the direct superclass matching a descriptor
pub fn superclass_constructor<'g>(
    class: &'g ClassData<'g>,
    descriptor: &MethodDescriptor<BinaryName>,
) -> Option<&'g MethodData<'g>> {
    let super_class = class.superclass?;
    super_class
        .declared_method(&UnqualifiedName::INIT, descriptor)
        .filter(|constructor| !constructor.is_private())
}

/// Overridable methods a class declares or inherits
///
/// This is the walk of [`inherited_virtual_methods`] with the class's own declarations
/// visited first. It answers what a fresh subtype of `class` could override.
pub fn declared_and_inherited_virtuals<'g>(
    class: &'g ClassData<'g>,
    skip: &HashSet<String>,
) -> Vec<&'g MethodData<'g>> {
    let mut seen: HashSet<String> = skip.clone();
    let mut found: Vec<&'g MethodData<'g>> = vec![];
    for method in class.methods.iter() {
        if method.is_overridable() && seen.insert(method.signature()) {
            found.push(method);
        }
    }
    found.extend(inherited_virtual_methods(class, &seen));
    found
}

/// Virtual methods a class inherits and could override
///
/// Superclasses are visited nearest first, then transitive interfaces, and only the first
/// declaration of each signature survives. A class implementation therefore shadows interface
/// declarations of the same signature. Signatures in `skip` are left out entirely.
pub fn inherited_virtual_methods<'g>(
    class: &'g ClassData<'g>,
    skip: &HashSet<String>,
) -> Vec<&'g MethodData<'g>> {
    let mut seen: HashSet<String> = skip.clone();
    let mut found: Vec<&'g MethodData<'g>> = vec![];
    let mut interfaces_to_visit: Vec<&'g ClassData<'g>> = vec![];
    let mut dont_revisit: HashSet<&'g BinaryName> = HashSet::new();

    for interface in class.interfaces.iter() {
        if dont_revisit.insert(&interface.name) {
            interfaces_to_visit.push(interface);
        }
    }

    let mut next_class = class.superclass;
    while let Some(ancestor) = next_class {
        for method in ancestor.methods.iter() {
            if method.is_overridable() && seen.insert(method.signature()) {
                found.push(method);
            }
        }
        for interface in ancestor.interfaces.iter() {
            if dont_revisit.insert(&interface.name) {
                interfaces_to_visit.push(interface);
            }
        }
        next_class = ancestor.superclass;
    }

    while let Some(interface) = interfaces_to_visit.pop() {
        for method in interface.methods.iter() {
            if method.is_overridable() && seen.insert(method.signature()) {
                found.push(method);
            }
        }
        for super_interface in interface.interfaces.iter() {
            if dont_revisit.insert(&super_interface.name) {
                interfaces_to_visit.push(super_interface);
            }
        }
    }

    found
}
