use crate::language::span::Location;
use crate::runtime::{
    error::{EvalError, EvalResult},
    scope::Slot,
    types::TypeId,
    value::{CapturedValue, Value},
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// What partial evaluation knows about a slot.
#[derive(Clone, Debug)]
pub enum Staged {
    /// Defined, but its value has not been evaluated yet.
    Pending,
    Known { ty: TypeId, value: Option<Value> },
}

/// Per-slot side table used while partially evaluating one function body.
#[derive(Debug, Default)]
pub struct StagingFrame {
    slot_count: usize,
    entries: HashMap<Slot, Staged>,
}

pub type StagingFrameRef = Rc<RefCell<StagingFrame>>;

impl StagingFrame {
    pub fn new(slot_count: usize) -> StagingFrameRef {
        Rc::new(RefCell::new(Self {
            slot_count,
            entries: HashMap::new(),
        }))
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn stage(&mut self, slot: Slot, staged: Staged) {
        self.slot_count = self.slot_count.max(slot + 1);
        self.entries.insert(slot, staged);
    }

    pub fn stage_known(&mut self, slot: Slot, ty: TypeId, value: Option<Value>) {
        self.stage(slot, Staged::Known { ty, value });
    }

    pub fn entry(&self, slot: Slot) -> Option<&Staged> {
        self.entries.get(&slot)
    }

    /// Constant value of a slot, if partial evaluation has one.
    pub fn constant(&self, slot: Slot) -> Option<Value> {
        match self.entries.get(&slot) {
            Some(Staged::Known { value, .. }) => value.clone(),
            _ => None,
        }
    }

    /// Independent copy used for template matching.
    pub fn fork(&self) -> StagingFrameRef {
        Rc::new(RefCell::new(Self {
            slot_count: self.slot_count,
            entries: self.entries.clone(),
        }))
    }
}

/// Concrete value storage for one call. Compile-time execution falls back to
/// the constants of a staging frame for slots it has not written.
#[derive(Debug, Default)]
pub struct Frame {
    slots: Vec<Option<Value>>,
    staging: Option<StagingFrameRef>,
}

impl Frame {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: vec![None; slot_count],
            staging: None,
        }
    }

    pub fn from_staging(staging: StagingFrameRef) -> Self {
        let slot_count = staging.borrow().slot_count();
        Self {
            slots: vec![None; slot_count],
            staging: Some(staging),
        }
    }

    pub fn set(&mut self, slot: Slot, value: Value) {
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = Some(value);
    }

    pub fn get(&self, slot: Slot, name: &str, location: Option<&Location>) -> EvalResult<Value> {
        if let Some(Some(value)) = self.slots.get(slot) {
            return Ok(value.clone());
        }
        let Some(staging) = &self.staging else {
            return Err(EvalError::ValueUnavailable {
                name: name.to_string(),
                location: location.cloned(),
            });
        };
        match staging.borrow().entry(slot) {
            Some(Staged::Known {
                value: Some(value), ..
            }) => Ok(value.clone()),
            Some(Staged::Pending) => Err(EvalError::UsedBeforeDefinition {
                name: name.to_string(),
                location: location.cloned(),
            }),
            _ => Err(EvalError::ValueUnavailable {
                name: name.to_string(),
                location: location.cloned(),
            }),
        }
    }

    /// Snapshot of a slot for a closure environment.
    pub fn capture(&self, slot: Slot, name: &str, compile_time: bool) -> EvalResult<CapturedValue> {
        if let Some(Some(value)) = self.slots.get(slot) {
            return Ok(CapturedValue::Ready(value.clone()));
        }
        let Some(staging) = &self.staging else {
            return Ok(CapturedValue::Missing(name.to_string()));
        };
        let captured = match staging.borrow().entry(slot) {
            Some(Staged::Known {
                value: Some(value), ..
            }) => CapturedValue::Ready(value.clone()),
            Some(Staged::Known { value: None, .. }) if compile_time => {
                return Err(EvalError::CompileTimeCapture {
                    name: name.to_string(),
                    location: None,
                })
            }
            Some(Staged::Known { value: None, .. }) => CapturedValue::Missing(name.to_string()),
            Some(Staged::Pending) | None => CapturedValue::Deferred {
                frame: staging.clone(),
                slot,
                name: name.to_string(),
            },
        };
        Ok(captured)
    }
}

impl CapturedValue {
    /// Current value of the capture, reading deferred slots now.
    pub fn resolve(&self) -> Option<Value> {
        match self {
            CapturedValue::Ready(value) => Some(value.clone()),
            CapturedValue::Deferred { frame, slot, .. } => frame.borrow().constant(*slot),
            CapturedValue::Missing(_) | CapturedValue::Recursive => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_time_frames_read_staged_constants() {
        let staging = StagingFrame::new(2);
        staging
            .borrow_mut()
            .stage_known(0, TypeId::INT, Some(Value::Int(7)));
        staging.borrow_mut().stage(1, Staged::Pending);
        let frame = Frame::from_staging(staging);

        assert_eq!(frame.get(0, "a", None).expect("constant"), Value::Int(7));
        assert!(matches!(
            frame.get(1, "b", None),
            Err(EvalError::UsedBeforeDefinition { .. })
        ));
    }

    #[test]
    fn written_slots_shadow_staged_constants() {
        let staging = StagingFrame::new(1);
        staging
            .borrow_mut()
            .stage_known(0, TypeId::INT, Some(Value::Int(1)));
        let mut frame = Frame::from_staging(staging);
        frame.set(0, Value::Int(2));

        assert_eq!(frame.get(0, "a", None).expect("slot"), Value::Int(2));
    }

    #[test]
    fn pending_slots_are_captured_as_deferred() {
        let staging = StagingFrame::new(1);
        staging.borrow_mut().stage(0, Staged::Pending);
        let frame = Frame::from_staging(staging.clone());

        let captured = frame.capture(0, "later", true).expect("capture");
        assert!(captured.resolve().is_none());

        staging
            .borrow_mut()
            .stage_known(0, TypeId::TYPE, Some(Value::Type(TypeId::INT)));
        assert_eq!(captured.resolve(), Some(Value::Type(TypeId::INT)));
    }

    #[test]
    fn compile_time_closures_reject_runtime_values() {
        let staging = StagingFrame::new(1);
        staging.borrow_mut().stage_known(0, TypeId::INT, None);
        let frame = Frame::from_staging(staging);

        assert!(matches!(
            frame.capture(0, "n", true),
            Err(EvalError::CompileTimeCapture { .. })
        ));
        assert!(matches!(
            frame.capture(0, "n", false),
            Ok(CapturedValue::Missing(_))
        ));
    }

    #[test]
    fn forks_do_not_leak_back() {
        let staging = StagingFrame::new(1);
        let fork = staging.borrow().fork();
        fork.borrow_mut()
            .stage_known(0, TypeId::TYPE, Some(Value::Type(TypeId::BOOL)));

        assert!(staging.borrow().entry(0).is_none());
    }
}
