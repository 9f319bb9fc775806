//! Built-in type catalog
//!
//! A representative slice of a graphics API: descriptor set layouts,
//! pipeline layouts, vertex input, shader stages, images, samplers and
//! render pass begin info, with the extension structs that chain onto them.

use crate::descriptor::{ElementKind, FieldDescriptor, ScalarType, TypeDescriptor};
use crate::type_registry::TypeRegistry;
use chainval_core::value::ApiVersion;
use once_cell::sync::Lazy;

/// Structure type tags
pub mod tags {
    use chainval_core::value::TypeTag;

    pub const IMAGE_CREATE_INFO: TypeTag = TypeTag(14);
    pub const PIPELINE_SHADER_STAGE_CREATE_INFO: TypeTag = TypeTag(18);
    pub const PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO: TypeTag = TypeTag(19);
    pub const PIPELINE_LAYOUT_CREATE_INFO: TypeTag = TypeTag(30);
    pub const SAMPLER_CREATE_INFO: TypeTag = TypeTag(31);
    pub const DESCRIPTOR_SET_LAYOUT_CREATE_INFO: TypeTag = TypeTag(32);
    pub const RENDER_PASS_BEGIN_INFO: TypeTag = TypeTag(43);
    pub const EXTERNAL_MEMORY_IMAGE_CREATE_INFO: TypeTag = TypeTag(1000072001);
    pub const RENDER_PASS_ATTACHMENT_BEGIN_INFO: TypeTag = TypeTag(1000108003);
    pub const SAMPLER_REDUCTION_MODE_CREATE_INFO: TypeTag = TypeTag(1000130001);
    pub const IMAGE_FORMAT_LIST_CREATE_INFO: TypeTag = TypeTag(1000147000);
    pub const DESCRIPTOR_SET_LAYOUT_BINDING_FLAGS_CREATE_INFO: TypeTag = TypeTag(1000161000);
    pub const IMAGE_STENCIL_USAGE_CREATE_INFO: TypeTag = TypeTag(1000246000);
    pub const MUTABLE_DESCRIPTOR_TYPE_CREATE_INFO_EXT: TypeTag = TypeTag(1000351002);
}

/// Enum and flag values referenced by the built-in rules
pub mod consts {
    pub const DESCRIPTOR_TYPE_MUTABLE_EXT: u32 = 1000351000;
    pub const IMAGE_CREATE_MUTABLE_FORMAT_BIT: u64 = 0x8;
    pub const FRAMEBUFFER_CREATE_IMAGELESS_BIT: u64 = 0x1;
}

static BUILTIN: Lazy<TypeRegistry> = Lazy::new(|| {
    TypeRegistry::builder()
        .with_types(builtin_types())
        .build()
        .expect("built-in type catalog is consistent")
});

/// The process-wide built-in registry
pub fn builtin_registry() -> &'static TypeRegistry {
    &BUILTIN
}

fn scalar(name: &str, ty: ScalarType) -> FieldDescriptor {
    FieldDescriptor::scalar(name, ty)
}

fn counted_structs(name: &str, element: &str, count: &str) -> FieldDescriptor {
    FieldDescriptor::counted(name, ElementKind::Struct(element.to_string()), count)
}

fn counted_scalars(name: &str, element: ScalarType, count: &str) -> FieldDescriptor {
    FieldDescriptor::counted(name, ElementKind::Scalar(element), count)
}

/// Descriptors for the built-in catalog
pub fn builtin_types() -> Vec<TypeDescriptor> {
    use ScalarType::*;

    vec![
        // Geometry helpers
        TypeDescriptor::plain("VkOffset2D")
            .with_field(scalar("x", I32))
            .with_field(scalar("y", I32)),
        TypeDescriptor::plain("VkExtent2D")
            .with_field(scalar("width", U32))
            .with_field(scalar("height", U32)),
        TypeDescriptor::plain("VkExtent3D")
            .with_field(scalar("width", U32))
            .with_field(scalar("height", U32))
            .with_field(scalar("depth", U32)),
        TypeDescriptor::plain("VkRect2D")
            .with_field(FieldDescriptor::nested("offset", "VkOffset2D"))
            .with_field(FieldDescriptor::nested("extent", "VkExtent2D")),
        // Descriptor set layouts
        TypeDescriptor::plain("VkDescriptorSetLayoutBinding")
            .with_field(scalar("binding", U32))
            .with_field(scalar("descriptorType", Enum))
            .with_field(scalar("descriptorCount", U32))
            .with_field(scalar("stageFlags", Flags))
            .with_field(
                counted_scalars("pImmutableSamplers", Handle, "descriptorCount").optional(),
            ),
        TypeDescriptor::extensible(
            "VkDescriptorSetLayoutCreateInfo",
            tags::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        )
        .with_field(scalar("flags", Flags))
        .with_field(scalar("bindingCount", U32))
        .with_field(counted_structs(
            "pBindings",
            "VkDescriptorSetLayoutBinding",
            "bindingCount",
        )),
        TypeDescriptor::extensible(
            "VkDescriptorSetLayoutBindingFlagsCreateInfo",
            tags::DESCRIPTOR_SET_LAYOUT_BINDING_FLAGS_CREATE_INFO,
        )
        .extends("VkDescriptorSetLayoutCreateInfo")
        .introduced(ApiVersion::V1_2)
        .with_field(scalar("bindingCount", U32))
        .with_field(counted_scalars("pBindingFlags", Flags, "bindingCount")),
        TypeDescriptor::plain("VkMutableDescriptorTypeListEXT")
            .with_field(scalar("descriptorTypeCount", U32))
            .with_field(counted_scalars(
                "pDescriptorTypes",
                Enum,
                "descriptorTypeCount",
            )),
        TypeDescriptor::extensible(
            "VkMutableDescriptorTypeCreateInfoEXT",
            tags::MUTABLE_DESCRIPTOR_TYPE_CREATE_INFO_EXT,
        )
        .extends("VkDescriptorSetLayoutCreateInfo")
        .with_field(scalar("mutableDescriptorTypeListCount", U32))
        .with_field(counted_structs(
            "pMutableDescriptorTypeLists",
            "VkMutableDescriptorTypeListEXT",
            "mutableDescriptorTypeListCount",
        )),
        // Pipeline layouts
        TypeDescriptor::plain("VkPushConstantRange")
            .with_field(scalar("stageFlags", Flags))
            .with_field(scalar("offset", U32))
            .with_field(scalar("size", U32)),
        TypeDescriptor::extensible(
            "VkPipelineLayoutCreateInfo",
            tags::PIPELINE_LAYOUT_CREATE_INFO,
        )
        .with_field(scalar("flags", Flags))
        .with_field(scalar("setLayoutCount", U32))
        .with_field(counted_scalars("pSetLayouts", Handle, "setLayoutCount"))
        .with_field(scalar("pushConstantRangeCount", U32))
        .with_field(counted_structs(
            "pPushConstantRanges",
            "VkPushConstantRange",
            "pushConstantRangeCount",
        )),
        // Vertex input
        TypeDescriptor::plain("VkVertexInputBindingDescription")
            .with_field(scalar("binding", U32))
            .with_field(scalar("stride", U32))
            .with_field(scalar("inputRate", Enum)),
        TypeDescriptor::plain("VkVertexInputAttributeDescription")
            .with_field(scalar("location", U32))
            .with_field(scalar("binding", U32))
            .with_field(scalar("format", Enum))
            .with_field(scalar("offset", U32)),
        TypeDescriptor::extensible(
            "VkPipelineVertexInputStateCreateInfo",
            tags::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        )
        .with_field(scalar("flags", Flags))
        .with_field(scalar("vertexBindingDescriptionCount", U32))
        .with_field(counted_structs(
            "pVertexBindingDescriptions",
            "VkVertexInputBindingDescription",
            "vertexBindingDescriptionCount",
        ))
        .with_field(scalar("vertexAttributeDescriptionCount", U32))
        .with_field(counted_structs(
            "pVertexAttributeDescriptions",
            "VkVertexInputAttributeDescription",
            "vertexAttributeDescriptionCount",
        )),
        // Shader stages
        TypeDescriptor::plain("VkSpecializationMapEntry")
            .with_field(scalar("constantID", U32))
            .with_field(scalar("offset", U32))
            .with_field(scalar("size", U64)),
        TypeDescriptor::plain("VkSpecializationInfo")
            .with_field(scalar("mapEntryCount", U32))
            .with_field(counted_structs(
                "pMapEntries",
                "VkSpecializationMapEntry",
                "mapEntryCount",
            ))
            .with_field(scalar("dataSize", U64)),
        TypeDescriptor::extensible(
            "VkPipelineShaderStageCreateInfo",
            tags::PIPELINE_SHADER_STAGE_CREATE_INFO,
        )
        .with_field(scalar("flags", Flags))
        .with_field(scalar("stage", Flags))
        .with_field(scalar("module", Handle))
        .with_field(scalar("pName", CString))
        .with_field(FieldDescriptor::pointer(
            "pSpecializationInfo",
            "VkSpecializationInfo",
        )),
        // Images
        TypeDescriptor::extensible("VkImageCreateInfo", tags::IMAGE_CREATE_INFO)
            .with_field(scalar("flags", Flags))
            .with_field(scalar("imageType", Enum))
            .with_field(scalar("format", Enum))
            .with_field(FieldDescriptor::nested("extent", "VkExtent3D"))
            .with_field(scalar("mipLevels", U32))
            .with_field(scalar("arrayLayers", U32))
            .with_field(scalar("samples", Flags))
            .with_field(scalar("tiling", Enum))
            .with_field(scalar("usage", Flags))
            .with_field(scalar("sharingMode", Enum))
            .with_field(scalar("queueFamilyIndexCount", U32).optional())
            .with_field(
                counted_scalars("pQueueFamilyIndices", U32, "queueFamilyIndexCount").optional(),
            )
            .with_field(scalar("initialLayout", Enum)),
        TypeDescriptor::extensible(
            "VkImageFormatListCreateInfo",
            tags::IMAGE_FORMAT_LIST_CREATE_INFO,
        )
        .extends("VkImageCreateInfo")
        .introduced(ApiVersion::V1_2)
        .with_field(scalar("viewFormatCount", U32))
        .with_field(counted_scalars("pViewFormats", Enum, "viewFormatCount")),
        TypeDescriptor::extensible(
            "VkImageStencilUsageCreateInfo",
            tags::IMAGE_STENCIL_USAGE_CREATE_INFO,
        )
        .extends("VkImageCreateInfo")
        .introduced(ApiVersion::V1_2)
        .with_field(scalar("stencilUsage", Flags)),
        TypeDescriptor::extensible(
            "VkExternalMemoryImageCreateInfo",
            tags::EXTERNAL_MEMORY_IMAGE_CREATE_INFO,
        )
        .extends("VkImageCreateInfo")
        .introduced(ApiVersion::V1_1)
        .with_field(scalar("handleTypes", Flags)),
        // Samplers
        TypeDescriptor::extensible("VkSamplerCreateInfo", tags::SAMPLER_CREATE_INFO)
            .with_field(scalar("flags", Flags))
            .with_field(scalar("magFilter", Enum))
            .with_field(scalar("minFilter", Enum))
            .with_field(scalar("mipmapMode", Enum))
            .with_field(scalar("addressModeU", Enum))
            .with_field(scalar("addressModeV", Enum))
            .with_field(scalar("addressModeW", Enum))
            .with_field(scalar("mipLodBias", F32))
            .with_field(scalar("anisotropyEnable", Bool))
            .with_field(scalar("maxAnisotropy", F32))
            .with_field(scalar("compareEnable", Bool))
            .with_field(scalar("compareOp", Enum))
            .with_field(scalar("minLod", F32))
            .with_field(scalar("maxLod", F32))
            .with_field(scalar("borderColor", Enum))
            .with_field(scalar("unnormalizedCoordinates", Bool)),
        TypeDescriptor::extensible(
            "VkSamplerReductionModeCreateInfo",
            tags::SAMPLER_REDUCTION_MODE_CREATE_INFO,
        )
        .extends("VkSamplerCreateInfo")
        .introduced(ApiVersion::V1_2)
        .with_field(scalar("reductionMode", Enum)),
        // Render pass begin
        TypeDescriptor::extensible("VkRenderPassBeginInfo", tags::RENDER_PASS_BEGIN_INFO)
            .with_field(scalar("renderPass", Handle))
            .with_field(scalar("framebuffer", Handle))
            .with_field(FieldDescriptor::nested("renderArea", "VkRect2D"))
            .with_field(scalar("clearValueCount", U32).optional()),
        TypeDescriptor::extensible(
            "VkRenderPassAttachmentBeginInfo",
            tags::RENDER_PASS_ATTACHMENT_BEGIN_INFO,
        )
        .extends("VkRenderPassBeginInfo")
        .introduced(ApiVersion::V1_2)
        .with_field(scalar("attachmentCount", U32))
        .with_field(counted_scalars("pAttachments", Handle, "attachmentCount")),
    ]
}
