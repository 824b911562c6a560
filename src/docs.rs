use crate::api::audit::{AuditFilter, AuditListResponse};
use crate::api::component::{
    AssignComponentReq, AssignmentListResponse, AssignmentRow, CreateComponentReq,
    UpdateComponentReq,
};
use crate::api::dashboard::{DashboardResponse, PeriodTotals};
use crate::api::employee::{
    CreateEmployeeReq, EmployeeListResponse, EmployeeQuery, PayrollHistoryRow,
};
use crate::api::loan::{
    ApplyLoanReq, LoanDetailResponse, LoanFilter, LoanListResponse, LoanListRow, SubmitPaymentReq,
};
use crate::api::payroll::{
    BulkApproveReq, CandidateQuery, CreatePayrollReq, PaginatedPayrollResponse, PayrollFilter,
    PayrollListRow, PayslipResponse, SettlementCandidates, UpdatePayrollReq,
};
use crate::core::compensation::{CompensationLine, ResolvedCompensation};
use crate::core::matcher::CandidateInstallment;
use crate::model::audit::AuditLog;
use crate::model::component::{CalcType, CompensationComponent, ComponentType, EmployeeCompensation};
use crate::model::employee::Employee;
use crate::model::loan::{Loan, LoanStatus};
use crate::model::payment::{Payment, PaymentStatus};
use crate::model::payroll::{Payroll, PayrollLoan, PayrollStatus};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Payroll & Loan Settlement API",
        version = "1.0.0",
        description = r#"
## Payroll & Loan Settlement Backend

This API computes monthly payrolls and settles employee loan installments
against them.

### 🔹 Key Features
- **Employee Management**
  - Auto-numbered NIK, archive/activate, payroll history
- **Pay Components**
  - Catalog of base/allowance/deduction rules, fixed or percentage of base,
    per-employee overrides with start periods
- **Loan Ledger**
  - Flat-interest loans, installment payments with approval flow,
    automatic completion when fully repaid
- **Payroll Settlement**
  - Draft runs with THR (pro-rated annual bonus), absence penalties,
    posting of approved loan payments as deductions, approval locking,
    reversal on draft deletion

### 🔐 Security
Most endpoints are protected using **JWT Bearer authentication**.
Administrative operations require the **Admin** role; workers can read
their own payslips, loans, and profile.

### 📦 Response Format
- JSON-based RESTful responses
- Pagination supported for list endpoints

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::toggle_employee,
        crate::api::employee::delete_employee,
        crate::api::employee::payroll_history,

        crate::api::component::create_component,
        crate::api::component::list_components,
        crate::api::component::update_component,
        crate::api::component::toggle_component,
        crate::api::component::delete_component,
        crate::api::component::assign_component,
        crate::api::component::list_assignments,
        crate::api::component::toggle_assignment,
        crate::api::component::delete_assignment,

        crate::api::loan::apply_loan,
        crate::api::loan::list_loans,
        crate::api::loan::get_loan,
        crate::api::loan::approve_loan,
        crate::api::loan::reject_loan,
        crate::api::loan::delete_loan,
        crate::api::loan::submit_payment,
        crate::api::loan::approve_payment,
        crate::api::loan::reject_payment,

        crate::api::payroll::create_payroll,
        crate::api::payroll::update_payroll,
        crate::api::payroll::list_payrolls,
        crate::api::payroll::get_payroll,
        crate::api::payroll::approve_payroll,
        crate::api::payroll::bulk_approve_payrolls,
        crate::api::payroll::delete_payroll,
        crate::api::payroll::settlement_candidates,

        crate::api::dashboard::dashboard,
        crate::api::audit::list_audit_logs
    ),
    components(
        schemas(
            Employee,
            CreateEmployeeReq,
            EmployeeQuery,
            EmployeeListResponse,
            PayrollHistoryRow,

            ComponentType,
            CalcType,
            CompensationComponent,
            EmployeeCompensation,
            CreateComponentReq,
            UpdateComponentReq,
            AssignComponentReq,
            AssignmentRow,
            AssignmentListResponse,

            Loan,
            LoanStatus,
            Payment,
            PaymentStatus,
            ApplyLoanReq,
            SubmitPaymentReq,
            LoanFilter,
            LoanListRow,
            LoanListResponse,
            LoanDetailResponse,

            Payroll,
            PayrollStatus,
            PayrollLoan,
            CreatePayrollReq,
            UpdatePayrollReq,
            PayrollFilter,
            PayrollListRow,
            PaginatedPayrollResponse,
            PayslipResponse,
            BulkApproveReq,
            CandidateQuery,
            CandidateInstallment,
            CompensationLine,
            ResolvedCompensation,
            SettlementCandidates,

            DashboardResponse,
            PeriodTotals,
            AuditLog,
            AuditFilter,
            AuditListResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Employee", description = "Employee management APIs"),
        (name = "Component", description = "Pay component catalog and assignment APIs"),
        (name = "Loan", description = "Loan and installment payment APIs"),
        (name = "Payroll", description = "Payroll settlement APIs"),
        (name = "Dashboard", description = "Aggregate reporting APIs"),
        (name = "Audit", description = "Audit trail APIs"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
