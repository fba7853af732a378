//! Program-level view of an SMG: named globals and a stack of frames.

use std::collections::BTreeMap;

use crate::graph::Smg;
use crate::object::Object;
use crate::types::ObjectId;

/// One function activation: named locals plus an optional return-value slot.
#[derive(Debug, Clone, Default)]
pub struct StackFrame {
    pub function: String,
    pub variables: BTreeMap<String, ObjectId>,
    pub return_object: Option<ObjectId>,
}

impl StackFrame {
    pub fn new(function: impl Into<String>) -> Self {
        StackFrame {
            function: function.into(),
            variables: BTreeMap::new(),
            return_object: None,
        }
    }
}

/// An [`Smg`] together with the variable bindings of one program state:
/// global variables and an ordered stack of frames.
#[derive(Debug, Clone, Default)]
pub struct ProgramSmg {
    smg: Smg,
    pub globals: BTreeMap<String, ObjectId>,
    pub stack: Vec<StackFrame>,
}

impl ProgramSmg {
    pub fn new() -> Self {
        ProgramSmg {
            smg: Smg::new(),
            globals: BTreeMap::new(),
            stack: Vec::new(),
        }
    }

    /// Assembles a program SMG from an already-built graph and its tables.
    pub fn from_parts(smg: Smg, globals: BTreeMap<String, ObjectId>, stack: Vec<StackFrame>) -> Self {
        ProgramSmg { smg, globals, stack }
    }

    pub fn smg(&self) -> &Smg {
        &self.smg
    }

    pub fn smg_mut(&mut self) -> &mut Smg {
        &mut self.smg
    }

    /// Allocates an object and binds it to a global variable name.
    pub fn add_global_object(&mut self, name: impl Into<String>, object: Object) -> ObjectId {
        let id = self.smg.add_object(object);
        self.globals.insert(name.into(), id);
        id
    }

    pub fn push_frame(&mut self, function: impl Into<String>) {
        self.stack.push(StackFrame::new(function));
    }

    /// Allocates an object and binds it to a local variable of the top frame.
    ///
    /// # Panics
    ///
    /// If there is no frame.
    pub fn add_local_object(&mut self, name: impl Into<String>, object: Object) -> ObjectId {
        let id = self.smg.add_object(object);
        let frame = self.stack.last_mut().unwrap_or_else(|| panic!("no stack frame"));
        frame.variables.insert(name.into(), id);
        id
    }

    /// Allocates the return-value slot of the top frame.
    ///
    /// # Panics
    ///
    /// If there is no frame, or the frame already has a return slot.
    pub fn add_return_object(&mut self, object: Object) -> ObjectId {
        let id = self.smg.add_object(object);
        let frame = self.stack.last_mut().unwrap_or_else(|| panic!("no stack frame"));
        assert!(frame.return_object.is_none(), "frame already has a return slot");
        frame.return_object = Some(id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_globals_and_frames() {
        let mut p = ProgramSmg::new();
        let g = p.add_global_object("g", Object::region(8));
        p.push_frame("main");
        let x = p.add_local_object("x", Object::region(4));
        let r = p.add_return_object(Object::region(4));

        assert_eq!(p.globals.get("g"), Some(&g));
        assert_eq!(p.stack.len(), 1);
        assert_eq!(p.stack[0].function, "main");
        assert_eq!(p.stack[0].variables.get("x"), Some(&x));
        assert_eq!(p.stack[0].return_object, Some(r));
        assert!(p.smg().has_object(g));
        assert!(p.smg().has_object(x));
    }

    #[test]
    #[should_panic]
    fn test_local_without_frame_panics() {
        let mut p = ProgramSmg::new();
        p.add_local_object("x", Object::region(4));
    }
}
