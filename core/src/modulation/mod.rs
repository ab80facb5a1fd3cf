pub mod features;
pub mod identifier;

pub use features::{FeatureExtractor, SampleSource, SignalFeatures, SpectralFeatureExtractor};
pub use identifier::{ModulationIdentifier, ModulationLabel, ModulationResult, RuleScore};
