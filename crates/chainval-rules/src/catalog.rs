//! Built-in rules for the built-in type catalog
//!
//! Rule ids follow the valid-usage ids of the API where one exists.

use crate::rule::{CompanionCheckSpec, RuleOwner, RuleSpec};
use crate::rule_set::RuleSet;
use crate::snapshot::Snapshot;
use chainval_core::severity::Severity;
use chainval_core::value::FieldValue;
use chainval_registry::catalog::tags;
use chainval_registry::builtin_registry;
use once_cell::sync::Lazy;

static BUILTIN: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::builder()
        .with_rules(builtin_rules())
        .build(builtin_registry())
        .expect("built-in rules compile against the built-in catalog")
});

/// The process-wide built-in rule set
pub fn builtin_rule_set() -> &'static RuleSet {
    &BUILTIN
}

fn tag(t: chainval_core::value::TypeTag) -> RuleOwner {
    RuleOwner::Tag(t)
}

fn named(name: &str) -> RuleOwner {
    RuleOwner::Type(name.to_string())
}

/// `pData` must cover every map entry; expressions cannot sum over arrays
fn map_entries_fit(snap: &Snapshot<'_>) -> bool {
    let node = snap.node();
    let data_size = match node.get("dataSize").and_then(FieldValue::as_count) {
        Some(size) => size,
        None => return true,
    };
    let count = node
        .get("mapEntryCount")
        .and_then(FieldValue::as_count)
        .unwrap_or(0) as usize;
    let Some(FieldValue::Array(Some(entries))) = node.get("pMapEntries") else {
        return true;
    };
    entries.iter().take(count).all(|entry| {
        let Some(entry) = entry.as_record() else {
            return true;
        };
        let offset = entry.get("offset").and_then(FieldValue::as_count).unwrap_or(0);
        let size = entry.get("size").and_then(FieldValue::as_count).unwrap_or(0);
        offset.saturating_add(size) <= data_size
    })
}

pub fn builtin_rules() -> Vec<RuleSpec> {
    vec![
        // Descriptor set layouts
        RuleSpec::pairwise(
            "VUID-VkDescriptorSetLayoutCreateInfo-binding-00279",
            tag(tags::DESCRIPTOR_SET_LAYOUT_CREATE_INFO),
            "pBindings",
            "a.binding != b.binding",
        )
        .message(
            "pBindings[%u].binding and pBindings[%u].binding are both [[%u]]",
            ["i", "j", "a.binding"],
        ),
        RuleSpec::require_companion(
            "VUID-VkDescriptorSetLayoutCreateInfo-pBindings-07303",
            tag(tags::DESCRIPTOR_SET_LAYOUT_CREATE_INFO),
            "elem.descriptorType == 1000351000",
            tags::MUTABLE_DESCRIPTOR_TYPE_CREATE_INFO_EXT,
        )
        .each("pBindings")
        .message(
            "pBindings[%u].descriptorType is VK_DESCRIPTOR_TYPE_MUTABLE_EXT but \
             [[VkMutableDescriptorTypeCreateInfoEXT]] is not in the pNext chain",
            ["i"],
        )
        .then_check(CompanionCheckSpec {
            id: "VUID-VkDescriptorSetLayoutCreateInfo-pBindings-07303-count".to_string(),
            assert: "companion.mutableDescriptorTypeListCount > i".to_string(),
            message: "pBindings[%u] is mutable but \
                      VkMutableDescriptorTypeCreateInfoEXT::mutableDescriptorTypeListCount \
                      is only [[%u]]"
                .to_string(),
            args: vec![
                "i".to_string(),
                "companion.mutableDescriptorTypeListCount".to_string(),
            ],
            severity: Severity::Error,
        }),
        RuleSpec::assert(
            "VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-bindingCount-03002",
            tag(tags::DESCRIPTOR_SET_LAYOUT_BINDING_FLAGS_CREATE_INFO),
            "node.bindingCount == 0 || node.bindingCount == root.bindingCount",
        )
        .message(
            "bindingCount ([[%u]]) is not zero and not equal to \
             VkDescriptorSetLayoutCreateInfo::bindingCount ([[%u]])",
            ["node.bindingCount", "root.bindingCount"],
        ),
        // Pipeline layouts
        RuleSpec::pairwise(
            "VUID-VkPipelineLayoutCreateInfo-pPushConstantRanges-00292",
            tag(tags::PIPELINE_LAYOUT_CREATE_INFO),
            "pPushConstantRanges",
            "(a.stageFlags & b.stageFlags) == 0",
        )
        .message(
            "pPushConstantRanges[%u] and pPushConstantRanges[%u] share stageFlags [[%x]]",
            ["i", "j", "a.stageFlags & b.stageFlags"],
        ),
        RuleSpec::assert(
            "VUID-VkPushConstantRange-size-00296",
            named("VkPushConstantRange"),
            "node.size != 0",
        )
        .with_message("size is [[0]]"),
        RuleSpec::assert(
            "VUID-VkPushConstantRange-stageFlags-requiredbitmask",
            named("VkPushConstantRange"),
            "node.stageFlags != 0",
        )
        .with_message("stageFlags is [[0]]"),
        // Vertex input
        RuleSpec::pairwise(
            "VUID-VkPipelineVertexInputStateCreateInfo-pVertexBindingDescriptions-00616",
            tag(tags::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO),
            "pVertexBindingDescriptions",
            "a.binding != b.binding",
        )
        .message(
            "pVertexBindingDescriptions[%u] and pVertexBindingDescriptions[%u] \
             both describe binding [[%u]]",
            ["i", "j", "a.binding"],
        ),
        RuleSpec::pairwise(
            "VUID-VkPipelineVertexInputStateCreateInfo-pVertexAttributeDescriptions-00617",
            tag(tags::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO),
            "pVertexAttributeDescriptions",
            "a.location != b.location",
        )
        .message(
            "pVertexAttributeDescriptions[%u] and pVertexAttributeDescriptions[%u] \
             both use location [[%u]]",
            ["i", "j", "a.location"],
        ),
        // Specialization constants
        RuleSpec::pairwise(
            "VUID-VkSpecializationInfo-constantID-04911",
            named("VkSpecializationInfo"),
            "pMapEntries",
            "a.constantID != b.constantID",
        )
        .message(
            "pMapEntries[%u] and pMapEntries[%u] both have constantID [[%u]]",
            ["i", "j", "a.constantID"],
        ),
        RuleSpec::custom(
            "VUID-VkSpecializationInfo-offset-00773",
            named("VkSpecializationInfo"),
            "every map entry lies within dataSize",
            map_entries_fit,
        )
        .message(
            "a map entry extends past dataSize ([[%zu]])",
            ["node.dataSize"],
        ),
        // Images
        RuleSpec::assert(
            "VUID-VkImageCreateInfo-extent-00944",
            tag(tags::IMAGE_CREATE_INFO),
            "node.extent.width != 0",
        )
        .with_message("extent.width is [[0]]"),
        RuleSpec::assert(
            "VUID-VkImageCreateInfo-extent-00945",
            tag(tags::IMAGE_CREATE_INFO),
            "node.extent.height != 0",
        )
        .with_message("extent.height is [[0]]"),
        RuleSpec::assert(
            "VUID-VkImageCreateInfo-extent-00946",
            tag(tags::IMAGE_CREATE_INFO),
            "node.extent.depth != 0",
        )
        .with_message("extent.depth is [[0]]"),
        RuleSpec::assert(
            "VUID-VkImageCreateInfo-mipLevels-00947",
            tag(tags::IMAGE_CREATE_INFO),
            "node.mipLevels != 0",
        )
        .with_message("mipLevels is [[0]]"),
        RuleSpec::assert(
            "VUID-VkImageCreateInfo-arrayLayers-00948",
            tag(tags::IMAGE_CREATE_INFO),
            "node.arrayLayers != 0",
        )
        .with_message("arrayLayers is [[0]]"),
        RuleSpec::assert(
            "VUID-VkImageCreateInfo-usage-requiredbitmask",
            tag(tags::IMAGE_CREATE_INFO),
            "node.usage != 0",
        )
        .with_message("usage is [[0]]"),
        RuleSpec::assert(
            "VUID-VkImageCreateInfo-pNext-04738",
            tag(tags::IMAGE_FORMAT_LIST_CREATE_INFO),
            "(root.flags & 0x8) != 0 || node.viewFormatCount <= 1",
        )
        .message(
            "VkImageFormatListCreateInfo::viewFormatCount is [[%u]] but \
             VkImageCreateInfo::flags ([[%x]]) lacks VK_IMAGE_CREATE_MUTABLE_FORMAT_BIT",
            ["node.viewFormatCount", "root.flags"],
        ),
        RuleSpec::assert(
            "VUID-VkImageStencilUsageCreateInfo-usage-requiredbitmask",
            tag(tags::IMAGE_STENCIL_USAGE_CREATE_INFO),
            "node.stencilUsage != 0",
        )
        .with_message("stencilUsage is [[0]]"),
        // Samplers
        RuleSpec::assert(
            "VUID-VkSamplerCreateInfo-maxLod-01973",
            tag(tags::SAMPLER_CREATE_INFO),
            "node.maxLod >= node.minLod",
        )
        .with_message("maxLod is less than minLod"),
        RuleSpec::assert(
            "VUID-VkSamplerCreateInfo-unnormalizedCoordinates-01076",
            tag(tags::SAMPLER_CREATE_INFO),
            "!node.unnormalizedCoordinates || !node.anisotropyEnable",
        )
        .message(
            "unnormalizedCoordinates is [[VK_TRUE]] while anisotropyEnable is %s",
            ["node.anisotropyEnable"],
        ),
        // Render pass begin
        RuleSpec::require_companion(
            "VUID-VkRenderPassBeginInfo-framebuffer-03207",
            tag(tags::RENDER_PASS_BEGIN_INFO),
            "state(node.framebuffer).flags & 0x1",
            tags::RENDER_PASS_ATTACHMENT_BEGIN_INFO,
        )
        .message(
            "framebuffer (%s) was created with VK_FRAMEBUFFER_CREATE_IMAGELESS_BIT but \
             [[VkRenderPassAttachmentBeginInfo]] is not in the pNext chain",
            ["node.framebuffer"],
        )
        .with_object("node.framebuffer")
        .then_check(CompanionCheckSpec {
            id: "VUID-VkRenderPassBeginInfo-framebuffer-03208".to_string(),
            assert: "companion.attachmentCount == state(node.framebuffer).attachmentImageInfoCount"
                .to_string(),
            message: "VkRenderPassAttachmentBeginInfo::attachmentCount is [[%u]] but \
                      framebuffer (%s) was created with attachmentImageInfoCount [[%u]]"
                .to_string(),
            args: vec![
                "companion.attachmentCount".to_string(),
                "node.framebuffer".to_string(),
                "state(node.framebuffer).attachmentImageInfoCount".to_string(),
            ],
            severity: Severity::Error,
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainval_core::value::Record;

    #[test]
    fn test_builtin_rules_compile() {
        let set = builtin_rule_set();
        assert_eq!(set.len(), builtin_rules().len());
        assert!(set
            .get("VUID-VkDescriptorSetLayoutCreateInfo-binding-00279")
            .is_some());
    }

    #[test]
    fn test_rules_for_push_constant_range() {
        let registry = builtin_registry();
        let pcr = registry.by_name("VkPushConstantRange").unwrap();
        assert_eq!(builtin_rule_set().rules_for(pcr).count(), 2);
    }

    #[test]
    fn test_map_entries_fit() {
        let entry = |offset: u32, size: u64| Record::new().with("offset", offset).with("size", size);
        let info = |entries: Vec<Record>| {
            Record::new()
                .with("mapEntryCount", entries.len() as u32)
                .with("pMapEntries", FieldValue::array(entries))
                .with("dataSize", 8u64)
        };
        let ok = info(vec![entry(0, 4), entry(4, 4)]);
        assert!(map_entries_fit(&Snapshot::new(&ok)));
        let bad = info(vec![entry(0, 4), entry(6, 4)]);
        assert!(!map_entries_fit(&Snapshot::new(&bad)));
    }
}
