pub mod extraction;
pub mod llm; // Local generative model client used by the rescue layer
pub mod reconcile;
