pub mod annotate;
pub mod frame_segmenter;
pub mod pixel;
pub mod pole_analyzer;
pub mod region;
pub mod region_extractor;
pub mod target_classifier;
