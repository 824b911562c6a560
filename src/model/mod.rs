pub mod audit;
pub mod component;
pub mod employee;
pub mod loan;
pub mod payment;
pub mod payroll;
pub mod role;
