pub mod dependency_checker;

pub use dependency_checker::DependencyChecker;
