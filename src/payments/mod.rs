pub mod registry;

pub use registry::PaymentRegistryView;
