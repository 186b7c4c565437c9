use std::collections::HashMap;

pub type Slot = usize;

/// Frame shape of one function, fixed once lowering of its body is done.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FunctionLayout {
    pub slot_count: usize,
    pub captures: Vec<Capture>,
    pub argument_captures: Vec<ArgumentCapture>,
    /// Index into `captures` of the entry that refers to the function itself.
    pub self_capture: Option<usize>,
}

/// Copies slot `from` of the defining frame into slot `to` of the callee frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Capture {
    pub name: String,
    pub from: Slot,
    pub to: Slot,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArgumentCapture {
    pub argument_index: usize,
    pub to: Slot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Clone, Copy, Debug)]
struct Binding {
    slot: Slot,
    deferred: bool,
}

#[derive(Debug)]
struct BlockScope {
    function: usize,
    parent: Option<ScopeId>,
    names: HashMap<String, Binding>,
}

#[derive(Debug)]
struct FunctionScope {
    /// Scope the function is defined in.
    parent: Option<ScopeId>,
    arguments: Vec<String>,
    slot_count: usize,
    resolved: HashMap<String, Slot>,
    captures: Vec<Capture>,
    argument_captures: Vec<ArgumentCapture>,
}

/// Arena of lexical scopes. Names resolve to slots of the innermost function;
/// crossing a function boundary records a capture.
#[derive(Debug, Default)]
pub struct Scopes {
    blocks: Vec<BlockScope>,
    functions: Vec<FunctionScope>,
}

impl Scopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a function and returns its outermost block scope.
    pub fn new_function(&mut self, parent: Option<ScopeId>, arguments: Vec<String>) -> ScopeId {
        let function = self.functions.len();
        self.functions.push(FunctionScope {
            parent,
            arguments,
            slot_count: 0,
            resolved: HashMap::new(),
            captures: Vec::new(),
            argument_captures: Vec::new(),
        });
        self.push_block(function, None)
    }

    pub fn new_block(&mut self, parent: ScopeId) -> ScopeId {
        let function = self.blocks[parent.0].function;
        self.push_block(function, Some(parent))
    }

    fn push_block(&mut self, function: usize, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.blocks.len());
        self.blocks.push(BlockScope {
            function,
            parent,
            names: HashMap::new(),
        });
        id
    }

    /// Allocates a fresh slot in the function owning `scope`.
    pub fn allocate(&mut self, scope: ScopeId) -> Slot {
        let function = &mut self.functions[self.blocks[scope.0].function];
        let slot = function.slot_count;
        function.slot_count += 1;
        slot
    }

    /// Binds `name` in `scope`. A deferred binding is only visible from
    /// nested functions until `undefer` is called.
    pub fn define(&mut self, scope: ScopeId, name: &str, deferred: bool) -> Slot {
        let slot = self.allocate(scope);
        self.blocks[scope.0]
            .names
            .insert(name.to_string(), Binding { slot, deferred });
        slot
    }

    /// Whether `name` is declared directly in `scope`, ignoring its parents.
    pub fn defines(&self, scope: ScopeId, name: &str) -> bool {
        self.blocks[scope.0].names.contains_key(name)
    }

    pub fn undefer(&mut self, scope: ScopeId, name: &str) {
        if let Some(binding) = self.blocks[scope.0].names.get_mut(name) {
            binding.deferred = false;
        }
    }

    pub fn access(&mut self, scope: ScopeId, name: &str) -> Option<Slot> {
        self.lookup(scope, name, false)
    }

    fn lookup(&mut self, scope: ScopeId, name: &str, crossing: bool) -> Option<Slot> {
        let function = self.blocks[scope.0].function;

        let mut current = Some(scope);
        while let Some(id) = current {
            let block = &self.blocks[id.0];
            if block.function != function {
                break;
            }
            if let Some(binding) = block.names.get(name) {
                if crossing || !binding.deferred {
                    return Some(binding.slot);
                }
            }
            current = block.parent;
        }

        if let Some(slot) = self.functions[function].resolved.get(name) {
            return Some(*slot);
        }

        let argument_index = self.functions[function]
            .arguments
            .iter()
            .position(|argument| argument == name);
        if let Some(argument_index) = argument_index {
            let to = self.allocate(scope);
            let function = &mut self.functions[function];
            function.argument_captures.push(ArgumentCapture { argument_index, to });
            function.resolved.insert(name.to_string(), to);
            return Some(to);
        }

        let parent = self.functions[function].parent?;
        let from = self.lookup(parent, name, true)?;
        let to = self.allocate(scope);
        let function = &mut self.functions[function];
        function.captures.push(Capture {
            name: name.to_string(),
            from,
            to,
        });
        function.resolved.insert(name.to_string(), to);
        Some(to)
    }

    /// Current layout of the function owning `scope`.
    pub fn layout(&self, scope: ScopeId) -> FunctionLayout {
        let function = &self.functions[self.blocks[scope.0].function];
        FunctionLayout {
            slot_count: function.slot_count,
            captures: function.captures.clone(),
            argument_captures: function.argument_captures.clone(),
            self_capture: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_of_one_function_share_slots() {
        let mut scopes = Scopes::new();
        let root = scopes.new_function(None, Vec::new());
        let a = scopes.define(root, "a", false);
        let inner = scopes.new_block(root);

        assert_eq!(scopes.access(inner, "a"), Some(a));
        assert!(scopes.layout(root).captures.is_empty());
    }

    #[test]
    fn shadowing_uses_the_innermost_binding() {
        let mut scopes = Scopes::new();
        let root = scopes.new_function(None, Vec::new());
        scopes.define(root, "a", false);
        let inner = scopes.new_block(root);
        let shadow = scopes.define(inner, "a", false);

        assert_eq!(scopes.access(inner, "a"), Some(shadow));
    }

    #[test]
    fn arguments_are_captured_once() {
        let mut scopes = Scopes::new();
        let body = scopes.new_function(None, vec!["a".into(), "b".into()]);

        let b = scopes.access(body, "b");
        assert_eq!(scopes.access(body, "b"), b);
        assert_eq!(
            scopes.layout(body).argument_captures,
            vec![ArgumentCapture {
                argument_index: 1,
                to: 0
            }]
        );
    }

    #[test]
    fn crossing_a_function_records_a_capture() {
        let mut scopes = Scopes::new();
        let root = scopes.new_function(None, Vec::new());
        scopes.define(root, "x", false);
        let from = scopes.define(root, "y", false);
        let body = scopes.new_function(Some(root), Vec::new());

        let to = scopes.access(body, "y").expect("captured");
        scopes.access(body, "y");

        assert_eq!(
            scopes.layout(body).captures,
            vec![Capture {
                name: "y".into(),
                from,
                to
            }]
        );
    }

    #[test]
    fn nested_functions_capture_through_their_parents() {
        let mut scopes = Scopes::new();
        let root = scopes.new_function(None, Vec::new());
        let outer = scopes.new_function(Some(root), vec!["a".into()]);
        let inner = scopes.new_function(Some(outer), vec!["b".into()]);

        scopes.access(inner, "a").expect("captured");

        let outer_layout = scopes.layout(outer);
        let inner_layout = scopes.layout(inner);
        assert_eq!(outer_layout.argument_captures.len(), 1);
        assert_eq!(inner_layout.captures[0].from, outer_layout.argument_captures[0].to);
    }

    #[test]
    fn deferred_names_are_only_visible_across_functions() {
        let mut scopes = Scopes::new();
        let root = scopes.new_function(None, Vec::new());
        let previous = scopes.define(root, "f", false);
        let block = scopes.new_block(root);
        let own = scopes.define(block, "f", true);

        assert_eq!(scopes.access(block, "f"), Some(previous));

        let body = scopes.new_function(Some(block), Vec::new());
        scopes.access(body, "f");
        assert_eq!(scopes.layout(body).captures[0].from, own);

        scopes.undefer(block, "f");
        assert_eq!(scopes.access(block, "f"), Some(own));
    }

    #[test]
    fn unknown_names_do_not_resolve() {
        let mut scopes = Scopes::new();
        let root = scopes.new_function(None, Vec::new());
        let body = scopes.new_function(Some(root), Vec::new());

        assert_eq!(scopes.access(body, "missing"), None);
        assert!(scopes.layout(body).captures.is_empty());
    }
}
