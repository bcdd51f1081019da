//! Known ComfyUI operation types and the pathway roles they play.
//!
//! Node shapes differ between executor installations, so the set is
//! closed over the types the compiler reasons about and falls back to
//! [`OperationType::Other`] for everything else. Inputs of unknown
//! types are carried verbatim.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Class type tags
// ---------------------------------------------------------------------------

pub const CHECKPOINT_LOADER: &str = "CheckpointLoaderSimple";
pub const UNET_LOADER: &str = "UNETLoader";
pub const CLIP_LOADER: &str = "CLIPLoader";
pub const DUAL_CLIP_LOADER: &str = "DualCLIPLoader";
pub const CLIP_SET_LAST_LAYER: &str = "CLIPSetLastLayer";
pub const CLIP_TEXT_ENCODE: &str = "CLIPTextEncode";
pub const CLIP_TEXT_ENCODE_SDXL: &str = "CLIPTextEncodeSDXL";
pub const KSAMPLER: &str = "KSampler";
pub const KSAMPLER_ADVANCED: &str = "KSamplerAdvanced";
pub const EMPTY_LATENT_IMAGE: &str = "EmptyLatentImage";
pub const LOAD_IMAGE: &str = "LoadImage";
pub const VAE_LOADER: &str = "VAELoader";
pub const VAE_ENCODE: &str = "VAEEncode";
pub const VAE_DECODE: &str = "VAEDecode";
pub const SAVE_IMAGE: &str = "SaveImage";
pub const PREVIEW_IMAGE: &str = "PreviewImage";
pub const LORA_LOADER: &str = "LoraLoader";
pub const LORA_LOADER_MODEL_ONLY: &str = "LoraLoaderModelOnly";
pub const LORA_STACK: &str = "CR LoRA Stack";
pub const APPLY_LORA_STACK: &str = "CR Apply LoRA Stack";

/// The computation a node performs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationType {
    CheckpointLoader,
    UnetLoader,
    ClipLoader,
    DualClipLoader,
    ClipSetLastLayer,
    ClipTextEncode,
    ClipTextEncodeSdxl,
    KSampler,
    KSamplerAdvanced,
    EmptyLatentImage,
    LoadImage,
    VaeLoader,
    VaeEncode,
    VaeDecode,
    SaveImage,
    PreviewImage,
    LoraLoader,
    LoraLoaderModelOnly,
    LoraStack,
    ApplyLoraStack,
    /// Any class type the compiler has no special knowledge of.
    Other(String),
}

impl OperationType {
    /// Map a ComfyUI `class_type` tag to a variant.
    pub fn from_class_type(class_type: &str) -> Self {
        match class_type {
            CHECKPOINT_LOADER => Self::CheckpointLoader,
            UNET_LOADER => Self::UnetLoader,
            CLIP_LOADER => Self::ClipLoader,
            DUAL_CLIP_LOADER => Self::DualClipLoader,
            CLIP_SET_LAST_LAYER => Self::ClipSetLastLayer,
            CLIP_TEXT_ENCODE => Self::ClipTextEncode,
            CLIP_TEXT_ENCODE_SDXL => Self::ClipTextEncodeSdxl,
            KSAMPLER => Self::KSampler,
            KSAMPLER_ADVANCED => Self::KSamplerAdvanced,
            EMPTY_LATENT_IMAGE => Self::EmptyLatentImage,
            LOAD_IMAGE => Self::LoadImage,
            VAE_LOADER => Self::VaeLoader,
            VAE_ENCODE => Self::VaeEncode,
            VAE_DECODE => Self::VaeDecode,
            SAVE_IMAGE => Self::SaveImage,
            PREVIEW_IMAGE => Self::PreviewImage,
            LORA_LOADER => Self::LoraLoader,
            LORA_LOADER_MODEL_ONLY => Self::LoraLoaderModelOnly,
            LORA_STACK => Self::LoraStack,
            APPLY_LORA_STACK => Self::ApplyLoraStack,
            other => Self::Other(other.to_string()),
        }
    }

    /// The ComfyUI `class_type` tag for this variant.
    pub fn class_type(&self) -> &str {
        match self {
            Self::CheckpointLoader => CHECKPOINT_LOADER,
            Self::UnetLoader => UNET_LOADER,
            Self::ClipLoader => CLIP_LOADER,
            Self::DualClipLoader => DUAL_CLIP_LOADER,
            Self::ClipSetLastLayer => CLIP_SET_LAST_LAYER,
            Self::ClipTextEncode => CLIP_TEXT_ENCODE,
            Self::ClipTextEncodeSdxl => CLIP_TEXT_ENCODE_SDXL,
            Self::KSampler => KSAMPLER,
            Self::KSamplerAdvanced => KSAMPLER_ADVANCED,
            Self::EmptyLatentImage => EMPTY_LATENT_IMAGE,
            Self::LoadImage => LOAD_IMAGE,
            Self::VaeLoader => VAE_LOADER,
            Self::VaeEncode => VAE_ENCODE,
            Self::VaeDecode => VAE_DECODE,
            Self::SaveImage => SAVE_IMAGE,
            Self::PreviewImage => PREVIEW_IMAGE,
            Self::LoraLoader => LORA_LOADER,
            Self::LoraLoaderModelOnly => LORA_LOADER_MODEL_ONLY,
            Self::LoraStack => LORA_STACK,
            Self::ApplyLoraStack => APPLY_LORA_STACK,
            Self::Other(s) => s,
        }
    }

    // ---- pathway roles ----

    /// Output slot carrying MODEL when this node originates the model
    /// pathway (a loader, not an adapter).
    pub fn base_model_slot(&self) -> Option<u32> {
        match self {
            Self::CheckpointLoader | Self::UnetLoader => Some(0),
            _ => None,
        }
    }

    /// Output slot carrying CLIP when this node originates the text
    /// conditioning pathway (a loader, not an adapter).
    pub fn base_clip_slot(&self) -> Option<u32> {
        match self {
            Self::CheckpointLoader => Some(1),
            Self::ClipLoader | Self::DualClipLoader => Some(0),
            _ => None,
        }
    }

    /// Output slot carrying MODEL for any node that produces one.
    pub fn model_slot(&self) -> Option<u32> {
        match self {
            Self::LoraLoader | Self::LoraLoaderModelOnly | Self::ApplyLoraStack => Some(0),
            _ => self.base_model_slot(),
        }
    }

    /// Output slot carrying CLIP for any node that produces one.
    pub fn clip_slot(&self) -> Option<u32> {
        match self {
            Self::LoraLoader | Self::ApplyLoraStack => Some(1),
            Self::ClipSetLastLayer => Some(0),
            _ => self.base_clip_slot(),
        }
    }

    /// Whether this node applies adapters to the model pathway.
    pub fn is_adapter_chain(&self) -> bool {
        matches!(
            self,
            Self::LoraLoader | Self::LoraLoaderModelOnly | Self::ApplyLoraStack
        )
    }

    /// Whether this node turns text plus CLIP into conditioning.
    pub fn is_text_conditioning_consumer(&self) -> bool {
        matches!(self, Self::ClipTextEncode | Self::ClipTextEncodeSdxl)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_type())
    }
}

impl From<&str> for OperationType {
    fn from(class_type: &str) -> Self {
        Self::from_class_type(class_type)
    }
}

impl Serialize for OperationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.class_type())
    }
}

impl<'de> Deserialize<'de> for OperationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_class_type(&s))
    }
}
