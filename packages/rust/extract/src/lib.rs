//! Post-processing of completion output into strict artifacts.
//!
//! Every function here is pure and deterministic:
//! - [`split_bilingual`]: one summary document → two language sections
//! - [`extract_mind_map`]: noisy model text → validated [`MindMapNode`] tree
//! - [`score_tags`]: title + summary + source URL → ranked [`TagSet`]
//! - [`strip_markdown`]: markup removal used before tokenizing
//!
//! [`MindMapNode`]: noteforge_shared::MindMapNode
//! [`TagSet`]: noteforge_shared::TagSet

pub mod bilingual;
pub mod markdown;
pub mod mindmap;
pub mod tags;

pub use bilingual::{
    PRIMARY_MARKER, SECONDARY_MARKER, SplitMethod, normalize_section, split_bilingual,
    split_with_method,
};
pub use markdown::strip_markdown;
pub use mindmap::{balanced_object, extract_mind_map, strip_code_fences};
pub use tags::score_tags;
