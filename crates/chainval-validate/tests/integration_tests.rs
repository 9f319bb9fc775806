//! End-to-end validation against the built-in catalog and rules.

use chainval_core::collaborators::InMemoryStateRegistry;
use chainval_core::value::{ExtensibleNode, FieldValue, Handle, Record, TypeTag};
use chainval_registry::catalog::{consts, tags};
use chainval_rules::diagnostic::structural;
use chainval_rules::fingerprint;
use chainval_validate::{walk_and_validate, CollectingReporter, Validator};
use std::sync::Arc;

fn validator() -> Validator {
    Validator::builtin().unwrap()
}

fn binding(b: u32, descriptor_type: u32) -> Record {
    Record::new()
        .with("binding", b)
        .with("descriptorType", FieldValue::Enum(descriptor_type))
        .with("descriptorCount", 1u32)
        .with("stageFlags", FieldValue::Flags(1))
}

fn layout(bindings: Vec<Record>) -> Record {
    Record::new()
        .with("flags", FieldValue::Flags(0))
        .with("bindingCount", bindings.len() as u32)
        .with("pBindings", FieldValue::array(bindings))
}

fn layout_node(bindings: Vec<Record>) -> ExtensibleNode {
    ExtensibleNode::new(tags::DESCRIPTOR_SET_LAYOUT_CREATE_INFO, layout(bindings))
}

fn mutable_lists(count: u32) -> ExtensibleNode {
    let list = || {
        Record::new()
            .with("descriptorTypeCount", 0u32)
            .with("pDescriptorTypes", FieldValue::null_array())
    };
    ExtensibleNode::new(
        tags::MUTABLE_DESCRIPTOR_TYPE_CREATE_INFO_EXT,
        Record::new()
            .with("mutableDescriptorTypeListCount", count)
            .with(
                "pMutableDescriptorTypeLists",
                FieldValue::array((0..count).map(|_| list()).collect::<Vec<_>>()),
            ),
    )
}

fn ids(outcome: &chainval_validate::Outcome) -> Vec<&str> {
    outcome.diagnostics.iter().map(|d| d.rule_id.as_str()).collect()
}

// =============================================================================
// Pairwise rules
// =============================================================================

#[test]
fn test_duplicate_binding_reported_once() {
    let node = layout_node(vec![binding(0, 0), binding(1, 0), binding(0, 0)]);
    let outcome = validator().validate_named("pCreateInfo", &node);

    assert_eq!(outcome.diagnostics.len(), 1);
    let d = &outcome.diagnostics[0];
    assert_eq!(d.rule_id, "VUID-VkDescriptorSetLayoutCreateInfo-binding-00279");
    assert_eq!(d.pair, Some((2, 0)));
    assert_eq!(d.location, "pCreateInfo->pBindings[2]");
    assert_eq!(
        outcome.messages[0].text,
        "pBindings[2].binding and pBindings[0].binding are both 0"
    );
    assert!(outcome.skip_call);
}

#[test]
fn test_distinct_bindings_are_clean() {
    let node = layout_node(vec![binding(0, 0), binding(1, 0), binding(2, 0)]);
    let outcome = validator().validate(&node);
    assert!(outcome.is_clean());
    assert!(!outcome.skip_call);
}

// =============================================================================
// Companion rules
// =============================================================================

#[test]
fn test_mutable_binding_without_companion() {
    let node = layout_node(vec![
        binding(0, 0),
        binding(1, consts::DESCRIPTOR_TYPE_MUTABLE_EXT),
    ]);
    let outcome = validator().validate_named("pCreateInfo", &node);

    // The count check only runs once the companion is found
    assert_eq!(
        ids(&outcome),
        vec!["VUID-VkDescriptorSetLayoutCreateInfo-pBindings-07303"]
    );
    assert_eq!(outcome.diagnostics[0].element, Some(1));
    assert_eq!(outcome.diagnostics[0].location, "pCreateInfo->pBindings[1]");
}

#[test]
fn test_mutable_binding_with_companion() {
    let mut info = layout(vec![
        binding(0, 0),
        binding(1, consts::DESCRIPTOR_TYPE_MUTABLE_EXT),
    ]);
    info = info.with_next(mutable_lists(2));
    let node = ExtensibleNode::new(tags::DESCRIPTOR_SET_LAYOUT_CREATE_INFO, info);
    let outcome = validator().validate(&node);
    assert!(outcome.is_clean(), "{:?}", outcome.messages);
    assert_eq!(outcome.nodes_visited, 1);
}

#[test]
fn test_mutable_companion_too_short() {
    let info = layout(vec![
        binding(0, 0),
        binding(1, consts::DESCRIPTOR_TYPE_MUTABLE_EXT),
    ])
    .with_next(mutable_lists(1));
    let node = ExtensibleNode::new(tags::DESCRIPTOR_SET_LAYOUT_CREATE_INFO, info);
    let outcome = validator().validate(&node);
    assert_eq!(
        ids(&outcome),
        vec!["VUID-VkDescriptorSetLayoutCreateInfo-pBindings-07303-count"]
    );
    assert!(outcome.messages[0].text.contains("is only 1"));
}

// =============================================================================
// Chains
// =============================================================================

#[test]
fn test_absent_chain_is_valid() {
    let outcome = validator().validate_chain(None);
    assert!(outcome.is_clean());
    assert_eq!(outcome.nodes_visited, 0);
    assert_eq!(outcome.fingerprint, fingerprint(&[]));
}

#[test]
fn test_unknown_tag_then_known_violation() {
    let head = ExtensibleNode::link(vec![
        ExtensibleNode::new(TypeTag(0x7fff_0001), Record::new()),
        ExtensibleNode::new(
            tags::IMAGE_STENCIL_USAGE_CREATE_INFO,
            Record::new().with("stencilUsage", FieldValue::Flags(0)),
        ),
    ]);
    let result = walk_and_validate(head.as_ref());
    assert_eq!(result.nodes_visited, 2);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(
        result.diagnostics[0].rule_id,
        "VUID-VkImageStencilUsageCreateInfo-usage-requiredbitmask"
    );
}

#[test]
fn test_visit_order_follows_chain() {
    let head = ExtensibleNode::link(vec![
        ExtensibleNode::new(
            tags::IMAGE_STENCIL_USAGE_CREATE_INFO,
            Record::new().with("stencilUsage", FieldValue::Flags(4)),
        ),
        ExtensibleNode::new(TypeTag(0x7fff_0002), Record::new()),
        ExtensibleNode::new(
            tags::EXTERNAL_MEMORY_IMAGE_CREATE_INFO,
            Record::new().with("handleTypes", FieldValue::Flags(1)),
        ),
    ]);
    let result = walk_and_validate(head.as_ref());
    assert!(result.diagnostics.is_empty());
    assert_eq!(
        result.visited_tags,
        vec![
            tags::IMAGE_STENCIL_USAGE_CREATE_INFO,
            TypeTag(0x7fff_0002),
            tags::EXTERNAL_MEMORY_IMAGE_CREATE_INFO,
        ]
    );
}

#[test]
fn test_very_long_chain_is_bounded_and_freed() {
    let head = ExtensibleNode::link(
        (0..200_000)
            .map(|i| ExtensibleNode::new(TypeTag(0x7f00_0000 + i), Record::new()))
            .collect(),
    );
    let result = walk_and_validate(head.as_ref());
    assert_eq!(result.nodes_visited, 1024);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].rule_id, structural::CHAIN_TOO_LONG);
    drop(head);
}

#[test]
fn test_binding_flags_count_may_be_zero() {
    let flags = ExtensibleNode::new(
        tags::DESCRIPTOR_SET_LAYOUT_BINDING_FLAGS_CREATE_INFO,
        Record::new()
            .with("bindingCount", 0u32)
            .with("pBindingFlags", FieldValue::null_array()),
    );
    let info = layout(vec![binding(0, 0), binding(1, 0)]).with_next(flags);
    let node = ExtensibleNode::new(tags::DESCRIPTOR_SET_LAYOUT_CREATE_INFO, info);
    assert!(validator().validate(&node).is_clean());
}

#[test]
fn test_binding_flags_count_mismatch() {
    let flags = ExtensibleNode::new(
        tags::DESCRIPTOR_SET_LAYOUT_BINDING_FLAGS_CREATE_INFO,
        Record::new()
            .with("bindingCount", 1u32)
            .with("pBindingFlags", FieldValue::array(vec![FieldValue::Flags(0)])),
    );
    let info = layout(vec![binding(0, 0), binding(1, 0)]).with_next(flags);
    let node = ExtensibleNode::new(tags::DESCRIPTOR_SET_LAYOUT_CREATE_INFO, info);
    let outcome = validator().validate_named("pCreateInfo", &node);
    assert_eq!(
        ids(&outcome),
        vec!["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-bindingCount-03002"]
    );
    assert_eq!(
        outcome.diagnostics[0].location,
        "pCreateInfo->pNext<VkDescriptorSetLayoutBindingFlagsCreateInfo>"
    );
}

#[test]
fn test_extension_on_wrong_root() {
    let info = layout(vec![]).with_next(ExtensibleNode::new(
        tags::IMAGE_STENCIL_USAGE_CREATE_INFO,
        Record::new().with("stencilUsage", FieldValue::Flags(4)),
    ));
    let node = ExtensibleNode::new(tags::DESCRIPTOR_SET_LAYOUT_CREATE_INFO, info);
    let outcome = validator().validate(&node);
    assert_eq!(ids(&outcome), vec![structural::EXTENSION_NOT_ALLOWED]);
}

// =============================================================================
// Structural checks
// =============================================================================

#[test]
fn test_zero_count_ignores_null_array() {
    let info = Record::new()
        .with("flags", FieldValue::Flags(0))
        .with("bindingCount", 0u32)
        .with("pBindings", FieldValue::null_array());
    let node = ExtensibleNode::new(tags::DESCRIPTOR_SET_LAYOUT_CREATE_INFO, info);
    assert!(validator().validate(&node).is_clean());
}

#[test]
fn test_count_exceeds_array() {
    let info = Record::new()
        .with("flags", FieldValue::Flags(0))
        .with("bindingCount", 3u32)
        .with("pBindings", FieldValue::array(vec![binding(0, 0)]));
    let node = ExtensibleNode::new(tags::DESCRIPTOR_SET_LAYOUT_CREATE_INFO, info);
    let outcome = validator().validate_named("pCreateInfo", &node);
    assert_eq!(ids(&outcome), vec![structural::COUNT_EXCEEDS_LENGTH]);
    assert_eq!(outcome.diagnostics[0].location, "pCreateInfo->pBindings");
}

#[test]
fn test_nested_struct_rules_run() {
    let range = |stage: u64, size: u32| {
        Record::new()
            .with("stageFlags", FieldValue::Flags(stage))
            .with("offset", 0u32)
            .with("size", size)
    };
    let info = Record::new()
        .with("flags", FieldValue::Flags(0))
        .with("setLayoutCount", 0u32)
        .with("pSetLayouts", FieldValue::null_array())
        .with("pushConstantRangeCount", 2u32)
        .with(
            "pPushConstantRanges",
            FieldValue::array(vec![range(0x1, 16), range(0x11, 0)]),
        );
    let node = ExtensibleNode::new(tags::PIPELINE_LAYOUT_CREATE_INFO, info);
    let outcome = validator().validate_named("pCreateInfo", &node);
    assert_eq!(
        ids(&outcome),
        vec![
            "VUID-VkPipelineLayoutCreateInfo-pPushConstantRanges-00292",
            "VUID-VkPushConstantRange-size-00296",
        ]
    );
    assert_eq!(
        outcome.diagnostics[1].location,
        "pCreateInfo->pPushConstantRanges[1]"
    );
    assert_eq!(
        outcome.messages[0].text,
        "pPushConstantRanges[1] and pPushConstantRanges[0] share stageFlags 1"
    );
}

// =============================================================================
// Object state
// =============================================================================

fn render_pass_begin(next: Option<ExtensibleNode>) -> ExtensibleNode {
    let area = Record::new()
        .with("offset", Record::new().with("x", 0i32).with("y", 0i32))
        .with("extent", Record::new().with("width", 64u32).with("height", 64u32));
    let mut record = Record::new()
        .with("renderPass", Handle::new("VkRenderPass", 0x20))
        .with("framebuffer", framebuffer())
        .with("renderArea", area);
    if let Some(next) = next {
        record = record.with_next(next);
    }
    ExtensibleNode::new(tags::RENDER_PASS_BEGIN_INFO, record)
}

fn framebuffer() -> Handle {
    Handle::new("VkFramebuffer", 0x10)
}

fn imageless_state() -> Arc<InMemoryStateRegistry> {
    Arc::new(InMemoryStateRegistry::new().with_object(
        framebuffer(),
        Record::new()
            .with("flags", FieldValue::Flags(consts::FRAMEBUFFER_CREATE_IMAGELESS_BIT))
            .with("attachmentImageInfoCount", 2u32),
    ))
}

fn attachments(count: u32) -> ExtensibleNode {
    let views: Vec<Handle> = (1..=count)
        .map(|n| Handle::new("VkImageView", n as u64))
        .collect();
    ExtensibleNode::new(
        tags::RENDER_PASS_ATTACHMENT_BEGIN_INFO,
        Record::new()
            .with("attachmentCount", count)
            .with("pAttachments", FieldValue::array(views)),
    )
}

#[test]
fn test_imageless_framebuffer_needs_attachments() {
    let v = validator().with_state(imageless_state());
    let outcome = v.validate_named("pRenderPassBegin", &render_pass_begin(None));
    assert_eq!(ids(&outcome), vec!["VUID-VkRenderPassBeginInfo-framebuffer-03207"]);
    assert_eq!(outcome.diagnostics[0].objects, vec![framebuffer()]);
    assert!(outcome.messages[0].text.contains("VkFramebuffer 0x10"));
}

#[test]
fn test_imageless_framebuffer_attachment_count() {
    let v = validator().with_state(imageless_state());
    assert!(v
        .validate(&render_pass_begin(Some(attachments(2))))
        .is_clean());
    let outcome = v.validate(&render_pass_begin(Some(attachments(1))));
    assert_eq!(ids(&outcome), vec!["VUID-VkRenderPassBeginInfo-framebuffer-03208"]);
}

#[test]
fn test_state_rules_skip_without_registry() {
    assert!(validator().validate(&render_pass_begin(None)).is_clean());
}

// =============================================================================
// Reporting and determinism
// =============================================================================

#[test]
fn test_reporter_decides_skip() {
    let reporter = Arc::new(CollectingReporter::new());
    let v = validator().with_reporter(reporter.clone());
    let node = layout_node(vec![binding(3, 0), binding(3, 0)]);
    let outcome = v.validate(&node);

    assert!(!outcome.skip_call);
    let entries = reporter.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].rule_id,
        "VUID-VkDescriptorSetLayoutCreateInfo-binding-00279"
    );
    assert!(entries[0]
        .message
        .starts_with("[ VUID-VkDescriptorSetLayoutCreateInfo-binding-00279 ]"));
}

#[test]
fn test_fingerprint_is_stable() {
    let node = layout_node(vec![binding(0, 0), binding(0, 0), binding(0, 0)]);
    let v = validator();
    let first = v.validate(&node);
    let second = v.validate(&node);
    assert_eq!(first.diagnostics.len(), 3);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert!(first.fingerprint.starts_with("blake3:"));

    let other = v.validate(&layout_node(vec![binding(0, 0), binding(0, 0)]));
    assert_ne!(first.fingerprint, other.fingerprint);
}
