//! Tuple and list editors driven by compile-time indices and slices.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::abstract_value::AbstractValue;
use crate::error::{check_args_size, CompositeError, Result};
use crate::ir::{GraphFlag, GraphId, GraphStore, Primitive};

use super::{empty_tuple, expect_list, MetaFuncGraph};

/// Container flavour a sequence editor emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SequenceKind {
    Tuple,
    List,
}

impl SequenceKind {
    pub fn maker(self) -> Primitive {
        match self {
            SequenceKind::Tuple => Primitive::make_tuple(),
            SequenceKind::List => Primitive::make_list(),
        }
    }

    pub fn getter(self) -> Primitive {
        match self {
            SequenceKind::Tuple => Primitive::tuple_getitem(),
            SequenceKind::List => Primitive::list_getitem(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            SequenceKind::Tuple => "tuple",
            SequenceKind::List => "list",
        }
    }
}

/// Normalized slice over a sequence of known length.
///
/// Positive steps address `start, start + step, ..` while below `stop`;
/// negative steps walk down while above `stop`. With a negative step an
/// index of `-1` means "past index 0".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SliceBounds {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl SliceBounds {
    /// Indices addressed by the slice, in visiting order.
    pub fn indices(&self) -> Vec<i64> {
        let mut indices = Vec::new();
        let mut index = self.start;
        if self.step > 0 {
            while index < self.stop {
                indices.push(index);
                index += self.step;
            }
        } else {
            while index > self.stop {
                indices.push(index);
                index += self.step;
            }
        }
        indices
    }
}

/// Resolves optional slice members against a sequence of length `len`.
///
/// Out-of-range members clamp to the nearest addressable bound for the
/// slice direction, then negative indices are shifted by `len`.
pub fn resolve_slice(len: i64, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Result<SliceBounds> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(CompositeError::value("Slice step cannot be zero."));
    }
    let (start_default, stop_default) = if step < 0 { (len - 1, -len - 1) } else { (0, len) };
    let start = clamp_index(start.unwrap_or(start_default), len, step);
    let stop = clamp_index(stop.unwrap_or(stop_default), len, step);
    Ok(SliceBounds { start, stop, step })
}

fn clamp_index(index: i64, len: i64, step: i64) -> i64 {
    let (lower, upper) = if step < 0 { (-1, len - 1) } else { (0, len) };
    if index < 0 {
        (index + len).max(lower)
    } else {
        index.min(upper)
    }
}

/// Constant value of one slice member; `None` when the member is unset.
pub fn slice_member(member: &AbstractValue, what: &str) -> Result<Option<i64>> {
    match member {
        AbstractValue::None => Ok(None),
        AbstractValue::Scalar { .. } => match member.build_value().and_then(|value| value.as_int()) {
            Some(value) => Ok(Some(value)),
            None => Err(CompositeError::type_error(format!(
                "The {what} must be a constant int, but got {member}"
            ))),
        },
        AbstractValue::Tensor { .. } => Err(CompositeError::type_error(
            "The argument of SliceMember operator must be a Scalar or None or constant Tensor, but got a variable Tensor",
        )),
        other => Err(CompositeError::type_error(format!(
            "The argument of SliceMember operator must be a Scalar or None or constant Tensor, but got {other}"
        ))),
    }
}

fn parse_slice(op: &str, len: usize, slice: &AbstractValue) -> Result<SliceBounds> {
    let AbstractValue::Slice { start, stop, step } = slice else {
        return Err(CompositeError::type_error(format!(
            "For '{op}', the second argument must be a slice, but got {slice}."
        )));
    };
    let step = slice_member(step, "Slice step value")?;
    let start = slice_member(start, "Slice start index")?;
    let stop = slice_member(stop, "Slice stop index")?;
    resolve_slice(len as i64, start, stop, step)
}

/// Concatenates two tuples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleAdd;

impl TupleAdd {
    /// Placeholder for signatures whose types are not inferred yet.
    fn generate_stub(&self, store: &mut GraphStore, args: &[AbstractValue]) -> GraphId {
        let graph = store.new_graph("tuple_add_stub");
        store.set_flag(graph, GraphFlag::Core);
        store.set_flag(graph, GraphFlag::Stub);
        for _ in args {
            store.add_parameter(graph);
        }
        let out = empty_tuple(store, graph);
        store.set_output(graph, out);
        debug!("generated stub for TupleAdd: @{}", store.graph(graph).name);
        graph
    }
}

impl MetaFuncGraph for TupleAdd {
    fn name(&self) -> String {
        "TupleAdd".to_string()
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        check_args_size("TupleAdd", args, 2)?;
        let (lhs, rhs) = match (&args[0], &args[1]) {
            (AbstractValue::Tuple(lhs), AbstractValue::Tuple(rhs)) => (lhs.len(), rhs.len()),
            _ if args.iter().any(|arg| matches!(arg, AbstractValue::Undetermined)) => {
                return Ok(self.generate_stub(store, args));
            }
            (first, second) => {
                return Err(CompositeError::type_error(format!(
                    "The type of argument in TupleAdd operator should be tuple, but the first argument is {first}, the second argument is {second}"
                )))
            }
        };

        let graph = store.new_graph("tuple_add");
        store.set_flag(graph, GraphFlag::Core);
        let a = store.add_parameter(graph);
        let b = store.add_parameter(graph);
        let getter = Primitive::tuple_getitem();
        let mut elems = Vec::with_capacity(lhs + rhs);
        for i in 0..lhs {
            elems.push(store.get_item(graph, &getter, a, i as i64));
        }
        for i in 0..rhs {
            elems.push(store.get_item(graph, &getter, b, i as i64));
        }
        let out = store.call_value(graph, Primitive::make_tuple(), elems);
        store.set_output(graph, out);
        Ok(graph)
    }
}

/// `sequence[start:stop:step]` with constant slice members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceSliceGetItem {
    kind: SequenceKind,
}

impl SequenceSliceGetItem {
    pub fn new(kind: SequenceKind) -> Self {
        Self { kind }
    }

    pub fn tuple() -> Self {
        Self::new(SequenceKind::Tuple)
    }

    pub fn list() -> Self {
        Self::new(SequenceKind::List)
    }
}

impl MetaFuncGraph for SequenceSliceGetItem {
    fn name(&self) -> String {
        format!("{}_slice_getitem", self.kind.as_str())
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        let name = self.name();
        check_args_size(&name, args, 2)?;
        let Some(elements) = args[0].elements() else {
            return Err(CompositeError::type_error(format!(
                "For '{name}', the first argument must be a tuple or list, but got {}.",
                args[0]
            )));
        };
        let bounds = parse_slice(&name, elements.len(), &args[1])?;

        let graph = store.new_graph(name);
        store.set_flag(graph, GraphFlag::Core);
        let seq = store.add_parameter(graph);
        store.add_parameter(graph);
        let getter = self.kind.getter();
        let elems = bounds
            .indices()
            .into_iter()
            .map(|index| store.get_item(graph, &getter, seq, index))
            .collect::<Vec<_>>();
        let out = store.call_value(graph, self.kind.maker(), elems);
        store.set_output(graph, out);
        Ok(graph)
    }
}

/// `list[start:stop:step] = values` producing the updated list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListSliceSetItem;

/// Source of one element of the updated list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Kept(i64),
    Assigned(i64),
}

impl ListSliceSetItem {
    fn check_assign_range(bounds: &SliceBounds, value_size: usize) -> Result<()> {
        if bounds.step == 1 {
            return Ok(());
        }
        let assign_size = bounds.indices().len();
        if assign_size != value_size {
            return Err(CompositeError::value(format!(
                "attempt to assign sequence of size {value_size} to extended slice of size {assign_size}"
            )));
        }
        Ok(())
    }

    /// Element order of the updated list.
    ///
    /// A unit step splices `values` in at `start`, replacing `start..stop`.
    /// Any other step overwrites the addressed indices one for one, so the
    /// sizes must already agree.
    fn plan(bounds: &SliceBounds, list_size: i64, value_size: usize) -> Vec<Slot> {
        let value_size = value_size as i64;
        if bounds.step == 1 {
            let resume = bounds.stop.max(bounds.start);
            return (0..bounds.start)
                .map(Slot::Kept)
                .chain((0..value_size).map(Slot::Assigned))
                .chain((resume..list_size).map(Slot::Kept))
                .collect();
        }
        let mut slots = (0..list_size).map(Slot::Kept).collect::<Vec<_>>();
        for (value_index, list_index) in bounds.indices().into_iter().enumerate() {
            slots[list_index as usize] = Slot::Assigned(value_index as i64);
        }
        slots
    }
}

impl MetaFuncGraph for ListSliceSetItem {
    fn name(&self) -> String {
        "list_slice_set_item".to_string()
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        let name = self.name();
        check_args_size(&name, args, 3)?;
        let list_size = expect_list(&name, 0, &args[0])?.len() as i64;
        let value_size = expect_list(&name, 2, &args[2])?.len();
        let bounds = parse_slice(&name, list_size as usize, &args[1])?;
        Self::check_assign_range(&bounds, value_size)?;
        let plan = Self::plan(&bounds, list_size, value_size);
        debug!("{name}: {bounds:?} over {list_size} element(s) -> {plan:?}");

        let graph = store.new_graph(name);
        store.set_flag(graph, GraphFlag::Core);
        let list = store.add_parameter(graph);
        store.add_parameter(graph);
        let values = store.add_parameter(graph);
        let getter = Primitive::list_getitem();
        let elems = plan
            .into_iter()
            .map(|slot| match slot {
                Slot::Kept(index) => store.get_item(graph, &getter, list, index),
                Slot::Assigned(index) => store.get_item(graph, &getter, values, index),
            })
            .collect::<Vec<_>>();
        let out = store.call_value(graph, Primitive::make_list(), elems);
        store.set_output(graph, out);
        Ok(graph)
    }
}

/// Selects one of a tuple of functions by a run-time index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleGetItemTensor;

impl MetaFuncGraph for TupleGetItemTensor {
    fn name(&self) -> String {
        "TupleGetItemTensor".to_string()
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        check_args_size("TupleGetItemTensor", args, 2)?;
        let graph = store.new_graph("tuple_getitem_tensor");
        store.set_flag(graph, GraphFlag::Core);
        let functions = store.add_parameter(graph);
        let index = store.add_parameter(graph);
        let out = store.call_value(graph, Primitive::switch_layer(), [index, functions]);
        store.set_output(graph, out);
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstract_value::DType;
    use crate::error::ErrorKind;

    #[test]
    fn negative_step_defaults_cover_whole_sequence() {
        let bounds = resolve_slice(5, None, None, Some(-1)).unwrap();
        assert_eq!(bounds, SliceBounds { start: 4, stop: -1, step: -1 });
        assert_eq!(bounds.indices(), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn out_of_range_members_are_clamped() {
        let bounds = resolve_slice(3, Some(-10), Some(10), None).unwrap();
        assert_eq!(bounds.indices(), vec![0, 1, 2]);
        let bounds = resolve_slice(3, Some(10), Some(-10), Some(-1)).unwrap();
        assert_eq!(bounds.indices(), vec![2, 1, 0]);
    }

    #[test]
    fn zero_step_is_a_value_error() {
        let err = resolve_slice(3, None, None, Some(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
        assert_eq!(err.to_string(), "ValueError: Slice step cannot be zero.");
    }

    #[test]
    fn variable_tensor_slice_member_is_rejected() {
        let member = AbstractValue::tensor(DType::I64, &[]);
        let err = slice_member(&member, "Slice start index").unwrap_err();
        assert!(err.to_string().contains("variable Tensor"));
        assert_eq!(slice_member(&AbstractValue::None, "x").unwrap(), None);
    }

    #[test]
    fn extended_slice_size_is_checked() {
        let bounds = resolve_slice(6, Some(0), None, Some(2)).unwrap();
        assert!(ListSliceSetItem::check_assign_range(&bounds, 3).is_ok());
        let err = ListSliceSetItem::check_assign_range(&bounds, 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValueError: attempt to assign sequence of size 2 to extended slice of size 3"
        );
    }

    #[test]
    fn empty_extended_slice_takes_no_values() {
        let bounds = resolve_slice(5, Some(3), Some(2), Some(2)).unwrap();
        assert!(ListSliceSetItem::check_assign_range(&bounds, 0).is_ok());
        let err = ListSliceSetItem::check_assign_range(&bounds, 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValueError: attempt to assign sequence of size 1 to extended slice of size 0"
        );
        let bounds = resolve_slice(5, Some(1), Some(3), Some(-1)).unwrap();
        assert!(ListSliceSetItem::check_assign_range(&bounds, 0).is_ok());
    }

    #[test]
    fn unit_step_with_stop_before_start_inserts() {
        let bounds = resolve_slice(4, Some(3), Some(1), None).unwrap();
        assert_eq!(
            ListSliceSetItem::plan(&bounds, 4, 1),
            vec![Slot::Kept(0), Slot::Kept(1), Slot::Kept(2), Slot::Assigned(0), Slot::Kept(3)]
        );
    }

    #[test]
    fn rejected_assignment_allocates_nothing() {
        let mut store = GraphStore::new();
        let tensor = AbstractValue::tensor(DType::F32, &[2]);
        let err = ListSliceSetItem
            .generate(
                &mut store,
                &[
                    AbstractValue::list(vec![tensor.clone(); 5]),
                    AbstractValue::slice(Some(3), Some(2), Some(2)),
                    AbstractValue::list(vec![tensor]),
                ],
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
        assert_eq!(store.graph_count(), 0);
    }

    #[test]
    fn tuple_add_falls_back_to_stub_for_undetermined_input() {
        let mut store = GraphStore::new();
        let graph = TupleAdd
            .generate(&mut store, &[AbstractValue::Undetermined, AbstractValue::tuple(vec![])])
            .unwrap();
        assert!(store.has_flag(graph, GraphFlag::Stub));

        let err = TupleAdd
            .generate(&mut store, &[AbstractValue::list(vec![]), AbstractValue::tuple(vec![])])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }
}
