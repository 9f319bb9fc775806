//! Structural Validator
//!
//! One generic walk over a record, driven entirely by its descriptor. It
//! checks presence and shape of every field, bounds array iteration by the
//! declared counts, and hands each nested record (and each nested chain) to
//! a [`RecordVisitor`] so rules owned by plain struct types still run.
//!
//! Nothing here asserts semantics, and nothing here stops early.

use chainval_core::location::Location;
use chainval_core::value::{FieldValue, Record, Scalar};
use chainval_registry::descriptor::{ElementKind, FieldDescriptor, FieldKind, TypeDescriptor};
use chainval_registry::type_registry::TypeRegistry;
use chainval_rules::diagnostic::{structural, Diagnostic};

/// Receives every record reached below the one being validated
pub trait RecordVisitor {
    fn visit_record(&mut self, descriptor: &TypeDescriptor, record: &Record, location: &Location);

    /// `record` carries an extension chain in its `next` link
    fn visit_chain(&mut self, owner: &TypeDescriptor, record: &Record, location: &Location);
}

/// Visitor that ignores everything
pub struct NoopVisitor;

impl RecordVisitor for NoopVisitor {
    fn visit_record(&mut self, _: &TypeDescriptor, _: &Record, _: &Location) {}
    fn visit_chain(&mut self, _: &TypeDescriptor, _: &Record, _: &Location) {}
}

#[derive(Clone, Copy)]
pub struct StructuralValidator<'a> {
    registry: &'a TypeRegistry,
}

impl<'a> StructuralValidator<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self { registry }
    }

    /// Validate `record` against `descriptor`, recursing into everything
    /// reachable from it
    ///
    /// The top-level record itself is not passed to the visitor.
    pub fn validate(
        &self,
        descriptor: &TypeDescriptor,
        record: &Record,
        location: &Location,
        visitor: &mut dyn RecordVisitor,
    ) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        self.fields(descriptor, record, location, visitor, &mut out);
        out
    }

    fn fields(
        &self,
        descriptor: &TypeDescriptor,
        record: &Record,
        location: &Location,
        visitor: &mut dyn RecordVisitor,
        out: &mut Vec<Diagnostic>,
    ) {
        for field in &descriptor.fields {
            let at = location.field(field.name.as_str());
            let value = record.get(&field.name);
            match &field.kind {
                FieldKind::Scalar { scalar } => match value {
                    None => missing(field, &at, out),
                    Some(v) if !scalar.accepts(v) => out.push(mismatch(&at, v, scalar.name())),
                    Some(_) => {}
                },
                FieldKind::Nested { type_name } => match value {
                    None => missing(field, &at, out),
                    Some(FieldValue::Struct(nested)) => {
                        self.nested(type_name, nested, &at, visitor, out)
                    }
                    Some(v) => out.push(mismatch(&at, v, type_name)),
                },
                FieldKind::OptionalPointer { type_name } => match value {
                    None | Some(FieldValue::Pointer(None)) => {}
                    Some(FieldValue::Pointer(Some(nested))) => {
                        self.nested(type_name, nested, &at.deref(), visitor, out)
                    }
                    Some(v) => out.push(mismatch(&at, v, "pointer")),
                },
                FieldKind::FixedArray { element, len } => match value {
                    None => missing(field, &at, out),
                    Some(FieldValue::Array(None)) => out.push(
                        Diagnostic::structural(
                            structural::NULL_ARRAY,
                            at.to_string(),
                            "%s is NULL but holds %zu fixed elements",
                        )
                        .with_arg("field", Scalar::Text(field.name.clone()))
                        .with_arg("len", Scalar::UInt(*len as u64)),
                    ),
                    Some(FieldValue::Array(Some(items))) => {
                        if items.len() < *len {
                            out.push(
                                Diagnostic::structural(
                                    structural::ARRAY_TOO_SHORT,
                                    at.to_string(),
                                    "%s has %zu elements, expected %zu",
                                )
                                .with_arg("field", Scalar::Text(field.name.clone()))
                                .with_arg("actual", Scalar::UInt(items.len() as u64))
                                .with_arg("expected", Scalar::UInt(*len as u64)),
                            );
                        }
                        self.elements(element, items.iter().take(*len), &at, visitor, out);
                    }
                    Some(v) => out.push(mismatch(&at, v, "array")),
                },
                FieldKind::CountedArray {
                    element,
                    count_field,
                } => {
                    // A missing or mistyped count is reported on the count field
                    let count = record
                        .get(count_field)
                        .and_then(FieldValue::as_count)
                        .unwrap_or(0);
                    if count == 0 {
                        continue;
                    }
                    match value {
                        None => missing(field, &at, out),
                        Some(FieldValue::Array(None)) if field.optional => {}
                        Some(FieldValue::Array(None)) => out.push(
                            Diagnostic::structural(
                                structural::NULL_ARRAY,
                                at.to_string(),
                                "%s is NULL but %s is %u",
                            )
                            .with_arg("field", Scalar::Text(field.name.clone()))
                            .with_arg("count_field", Scalar::Text(count_field.clone()))
                            .with_arg("count", Scalar::UInt(count)),
                        ),
                        Some(FieldValue::Array(Some(items))) => {
                            if (items.len() as u64) < count {
                                out.push(
                                    Diagnostic::structural(
                                        structural::COUNT_EXCEEDS_LENGTH,
                                        at.to_string(),
                                        "%s is %u but %s holds only %zu elements",
                                    )
                                    .with_arg("count_field", Scalar::Text(count_field.clone()))
                                    .with_arg("count", Scalar::UInt(count))
                                    .with_arg("field", Scalar::Text(field.name.clone()))
                                    .with_arg("len", Scalar::UInt(items.len() as u64)),
                                );
                            }
                            let bound = usize::try_from(count).unwrap_or(usize::MAX);
                            self.elements(element, items.iter().take(bound), &at, visitor, out);
                        }
                        Some(v) => out.push(mismatch(&at, v, "array")),
                    }
                }
            }
        }
    }

    fn elements<'v>(
        &self,
        element: &ElementKind,
        items: impl Iterator<Item = &'v FieldValue>,
        location: &Location,
        visitor: &mut dyn RecordVisitor,
        out: &mut Vec<Diagnostic>,
    ) {
        for (i, item) in items.enumerate() {
            let at = location.index(i);
            match element {
                ElementKind::Scalar(scalar) if !scalar.accepts(item) => {
                    out.push(mismatch(&at, item, scalar.name()))
                }
                ElementKind::Scalar(_) => {}
                ElementKind::Struct(type_name) => match item {
                    FieldValue::Struct(nested) => self.nested(type_name, nested, &at, visitor, out),
                    other => out.push(mismatch(&at, other, type_name)),
                },
            }
        }
    }

    fn nested(
        &self,
        type_name: &str,
        record: &Record,
        location: &Location,
        visitor: &mut dyn RecordVisitor,
        out: &mut Vec<Diagnostic>,
    ) {
        let Some(descriptor) = self.registry.by_name(type_name) else {
            tracing::debug!(type_name, "no descriptor for nested type");
            return;
        };
        visitor.visit_record(descriptor, record, location);
        if record.next().is_some() {
            visitor.visit_chain(descriptor, record, location);
        }
        self.fields(descriptor, record, location, visitor, out);
    }
}

fn missing(field: &FieldDescriptor, location: &Location, out: &mut Vec<Diagnostic>) {
    if field.optional {
        return;
    }
    out.push(
        Diagnostic::structural(
            structural::MISSING_FIELD,
            location.to_string(),
            "required field %s is missing",
        )
        .with_arg("field", Scalar::Text(field.name.clone())),
    );
}

fn mismatch(location: &Location, value: &FieldValue, expected: &str) -> Diagnostic {
    Diagnostic::structural(
        structural::TYPE_MISMATCH,
        location.to_string(),
        "%s holds a %s value, expected %s",
    )
    .with_arg("location", Scalar::Text(location.to_string()))
    .with_arg("actual", Scalar::Text(value.kind_name().to_string()))
    .with_arg("expected", Scalar::Text(expected.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainval_core::value::{ExtensibleNode, TypeTag};
    use chainval_registry::descriptor::{FieldDescriptor, ScalarType};

    fn registry() -> TypeRegistry {
        TypeRegistry::builder()
            .with_type(
                TypeDescriptor::plain("Inner")
                    .with_field(FieldDescriptor::scalar("value", ScalarType::U32)),
            )
            .with_type(
                TypeDescriptor::extensible("Outer", TypeTag(1))
                    .with_field(FieldDescriptor::scalar("flags", ScalarType::Flags))
                    .with_field(FieldDescriptor::nested("inner", "Inner"))
                    .with_field(FieldDescriptor::pointer("pOptional", "Inner"))
                    .with_field(FieldDescriptor::scalar("count", ScalarType::U32))
                    .with_field(FieldDescriptor::counted(
                        "pItems",
                        ElementKind::Struct("Inner".to_string()),
                        "count",
                    ))
                    .with_field(FieldDescriptor::fixed_array(
                        "matrix",
                        ElementKind::Scalar(ScalarType::F32),
                        2,
                    )),
            )
            .build()
            .unwrap()
    }

    fn inner(v: u32) -> Record {
        Record::new().with("value", v)
    }

    fn outer() -> Record {
        Record::new()
            .with("flags", FieldValue::Flags(0))
            .with("inner", inner(1))
            .with("pOptional", FieldValue::null_pointer())
            .with("count", 2u32)
            .with("pItems", FieldValue::array(vec![inner(2), inner(3)]))
            .with("matrix", FieldValue::array(vec![1.0f32, 0.0f32]))
    }

    /// Records every location handed to the visitor
    #[derive(Default)]
    struct Recorder {
        records: Vec<String>,
        chains: Vec<String>,
    }

    impl RecordVisitor for Recorder {
        fn visit_record(&mut self, descriptor: &TypeDescriptor, _: &Record, location: &Location) {
            self.records.push(format!("{}@{}", descriptor.name, location));
        }

        fn visit_chain(&mut self, owner: &TypeDescriptor, _: &Record, location: &Location) {
            self.chains.push(format!("{}@{}", owner.name, location));
        }
    }

    fn run(record: &Record, visitor: &mut dyn RecordVisitor) -> Vec<Diagnostic> {
        let registry = registry();
        let desc = registry.by_name("Outer").unwrap().clone();
        StructuralValidator::new(&registry).validate(&desc, record, &Location::root("pInfo"), visitor)
    }

    #[test]
    fn test_valid_record_reaches_every_nested_value() {
        let mut rec = Recorder::default();
        let diags = run(&outer(), &mut rec);
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(
            rec.records,
            vec!["Inner@pInfo->inner", "Inner@pInfo->pItems[0]", "Inner@pInfo->pItems[1]"]
        );
    }

    #[test]
    fn test_optional_pointer_followed_when_present() {
        let record = outer().with("pOptional", FieldValue::pointer(inner(9)));
        let mut rec = Recorder::default();
        assert!(run(&record, &mut rec).is_empty());
        assert!(rec.records.contains(&"Inner@pInfo->pOptional".to_string()));
    }

    #[test]
    fn test_missing_and_mismatched_fields() {
        let mut record = outer();
        record.fields.remove("flags");
        let record = record.with("inner", Record::new().with("value", true));
        let diags = run(&record, &mut NoopVisitor);
        let ids: Vec<_> = diags.iter().map(|d| d.rule_id.as_str()).collect();
        assert_eq!(ids, vec![structural::MISSING_FIELD, structural::TYPE_MISMATCH]);
        assert_eq!(diags[0].location, "pInfo->flags");
        assert_eq!(diags[1].location, "pInfo->inner.value");
    }

    #[test]
    fn test_null_array_with_count() {
        let record = outer().with("pItems", FieldValue::null_array());
        let diags = run(&record, &mut NoopVisitor);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].rule_id, structural::NULL_ARRAY);
    }

    #[test]
    fn test_count_zero_never_iterates() {
        let record = outer()
            .with("count", 0u32)
            .with("pItems", FieldValue::null_array());
        let mut rec = Recorder::default();
        assert!(run(&record, &mut rec).is_empty());
        assert_eq!(rec.records, vec!["Inner@pInfo->inner"]);
    }

    #[test]
    fn test_count_exceeds_length_is_bounded() {
        let record = outer().with("count", 5u32);
        let mut rec = Recorder::default();
        let diags = run(&record, &mut rec);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].rule_id, structural::COUNT_EXCEEDS_LENGTH);
        assert_eq!(rec.records.len(), 3);
    }

    #[test]
    fn test_fixed_array_too_short() {
        let record = outer().with("matrix", FieldValue::array(vec![1.0f32]));
        let diags = run(&record, &mut NoopVisitor);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].rule_id, structural::ARRAY_TOO_SHORT);
    }

    #[test]
    fn test_nested_chain_handed_to_visitor() {
        let chained = inner(1).with_next(ExtensibleNode::new(TypeTag(77), Record::new()));
        let record = outer().with("inner", chained);
        let mut rec = Recorder::default();
        run(&record, &mut rec);
        assert_eq!(rec.chains, vec!["Inner@pInfo->inner"]);
    }
}
