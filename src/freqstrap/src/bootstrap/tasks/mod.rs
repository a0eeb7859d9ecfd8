mod provision_step;

pub use provision_step::ProvisionStep;
