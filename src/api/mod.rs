pub mod audit;
pub mod component;
pub mod dashboard;
pub mod employee;
pub mod loan;
pub mod payroll;
