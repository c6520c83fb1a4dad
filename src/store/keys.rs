//! Fixed storage keys, one per domain collection.

/// Key under which a value lives in the persistent store.
///
/// The set is closed: every denormalized snapshot the application persists
/// has a named slot here. Values are JSON-serialized blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
  Token,
  User,
  Clients,
  Leads,
  Projects,
  TimeEntries,
  Invoices,
  Users,
  TeamDocuments,
  TeamWorkflows,
  TeamChecklists,
  TeamNotices,
  Employees,
  LeaveApplications,
  LeaveBalances,
  Attendance,
  Payroll,
  AccountingConnection,
  AccountingSettings,
  AccountingMapping,
}

impl StoreKey {
  pub fn as_str(&self) -> &'static str {
    match self {
      StoreKey::Token => "bizsync_token",
      StoreKey::User => "bizsync_user",
      StoreKey::Clients => "bizsync_clients",
      StoreKey::Leads => "bizsync_leads",
      StoreKey::Projects => "bizsync_projects",
      StoreKey::TimeEntries => "bizsync_time_entries",
      StoreKey::Invoices => "bizsync_invoices",
      StoreKey::Users => "bizsync_users",
      StoreKey::TeamDocuments => "bizsync_team_documents",
      StoreKey::TeamWorkflows => "bizsync_team_workflows",
      StoreKey::TeamChecklists => "bizsync_team_checklists",
      StoreKey::TeamNotices => "bizsync_team_notices",
      StoreKey::Employees => "bizsync_employees",
      StoreKey::LeaveApplications => "bizsync_leave_applications",
      StoreKey::LeaveBalances => "bizsync_leave_balances",
      StoreKey::Attendance => "bizsync_attendance",
      StoreKey::Payroll => "bizsync_payroll",
      StoreKey::AccountingConnection => "bizsync_accounting_connection",
      StoreKey::AccountingSettings => "bizsync_accounting_settings",
      StoreKey::AccountingMapping => "bizsync_accounting_mapping",
    }
  }
}

impl std::fmt::Display for StoreKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}
