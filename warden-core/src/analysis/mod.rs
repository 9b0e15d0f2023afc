//! Live performance analysis and backtest acceptance

pub mod criteria;
pub mod performance;

pub use criteria::ValidationCriteria;
pub use performance::{
    AnalysisOutcome, AnalyzerConfig, BreakerTrigger, DegradationLevel, LiveMetrics,
    PerformanceAnalyzer, PerformanceAssessment,
};
