//! The owning aggregate for all extracted reports.
//!
//! Reports are kept newest-first. At most one report is active, and it is
//! always a member. Every transition is applied in full before observers are
//! called, so no observer can see a half-applied change.
//!
//! Persistence is coalesced: `update`, `set_active` and theme changes only mark
//! the library dirty, while `add` and `delete` flush whatever is pending before
//! returning. A burst of edits followed by one add therefore costs one write.
//! Hosts that only edit should call [`ReportLibrary::flush`] at the end of
//! their tick.
//!
//! `add` and `delete` are not applied unless their write succeeds; on a store
//! failure the library is rolled back and observers hear nothing.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::{AnalyzerError, Result, SchemaError};
use crate::schema::FinancialReport;
use crate::store::KeyValueStore;

/// The blob written to the store: `{"reports", "activeReportId", "isDarkMode"}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub reports: Vec<FinancialReport>,
    #[serde(default)]
    pub active_report_id: Option<String>,
    #[serde(default)]
    pub is_dark_mode: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Empty,
    Restored { reports: usize },
    /// The stored blob could not be parsed; the library started empty.
    Corrupt { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Added(String),
    Updated(String),
    Deleted(String),
    ActiveChanged(Option<String>),
    ThemeChanged(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LibrarySnapshot {
    pub transition: Transition,
    pub reports: Vec<FinancialReport>,
    pub active_report_id: Option<String>,
    pub is_dark_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&LibrarySnapshot) + Send>;

pub struct ReportLibrary<S: KeyValueStore> {
    store: S,
    key: String,
    reports: Vec<FinancialReport>,
    active_id: Option<String>,
    dark_mode: bool,
    extra: Map<String, Value>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
    dirty: bool,
    load_status: LoadStatus,
}

impl<S: KeyValueStore> ReportLibrary<S> {
    /// Loads eagerly from `store`. A corrupt blob is not fatal: the library
    /// starts empty and reports [`LoadStatus::Corrupt`].
    pub async fn load(store: S, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let blob = store.get(&key).await?;

        let (state, status) = match blob {
            None => (PersistedState::default(), LoadStatus::Empty),
            Some(raw) => match serde_json::from_str::<PersistedState>(&raw) {
                Ok(state) => {
                    let count = state.reports.len();
                    (state, LoadStatus::Restored { reports: count })
                }
                Err(e) => {
                    warn!(
                        "Persisted library under '{}' is corrupt ({}); starting empty",
                        key, e
                    );
                    (
                        PersistedState::default(),
                        LoadStatus::Corrupt {
                            reason: e.to_string(),
                        },
                    )
                }
            },
        };

        Ok(Self::from_state(store, key, state, status))
    }

    /// Like [`ReportLibrary::load`] but refuses to discard a corrupt blob.
    pub async fn load_strict(store: S, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let state = match store.get(&key).await? {
            None => PersistedState::default(),
            Some(raw) => serde_json::from_str::<PersistedState>(&raw)
                .map_err(|e| AnalyzerError::PersistenceCorrupt(e.to_string()))?,
        };
        let status = if state.reports.is_empty() {
            LoadStatus::Empty
        } else {
            LoadStatus::Restored {
                reports: state.reports.len(),
            }
        };
        Ok(Self::from_state(store, key, state, status))
    }

    fn from_state(store: S, key: String, state: PersistedState, status: LoadStatus) -> Self {
        let mut seen = HashSet::new();
        let mut reports = Vec::with_capacity(state.reports.len());
        for report in state.reports {
            if seen.insert(report.id.clone()) {
                reports.push(report);
            } else {
                warn!("Dropping duplicate persisted report '{}'", report.id);
            }
        }

        let active_id = match state.active_report_id {
            Some(id) if reports.iter().any(|r| r.id == id) => Some(id),
            Some(id) => {
                warn!("Persisted active report '{}' is not in the library", id);
                reports.first().map(|r| r.id.clone())
            }
            None => None,
        };

        debug!(
            "Loaded report library '{}' with {} reports",
            key,
            reports.len()
        );

        Self {
            store,
            key,
            reports,
            active_id,
            dark_mode: state.is_dark_mode,
            extra: state.extra,
            observers: Vec::new(),
            next_subscription: 0,
            dirty: false,
            load_status: status,
        }
    }

    pub fn load_status(&self) -> &LoadStatus {
        &self.load_status
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn storage_key(&self) -> &str {
        &self.key
    }

    /// Inserts at the head and makes the report active.
    pub async fn add(&mut self, report: FinancialReport) -> Result<()> {
        if !report.has_identity() {
            return Err(SchemaError::Incomplete {
                field: "id".to_string(),
            }
            .into());
        }
        report.check_storable()?;
        if self.position(&report.id).is_some() {
            return Err(AnalyzerError::DuplicateIdentity(report.id));
        }

        let id = report.id.clone();
        self.reports.insert(0, report);
        let previous_active = self.active_id.replace(id.clone());
        let was_dirty = std::mem::replace(&mut self.dirty, true);

        if let Err(e) = self.flush().await {
            warn!("Could not persist new report {}: {}", id, e);
            self.reports.remove(0);
            self.active_id = previous_active;
            self.dirty = was_dirty;
            return Err(e);
        }

        if let Some(added) = self.reports.first() {
            info!(
                "Added report {} ({} {} {})",
                id, added.ticker, added.report_period, added.report_year
            );
        }
        self.notify(Transition::Added(id));
        Ok(())
    }

    /// Replaces a report in place. Only enrichment fields may differ.
    pub fn update(&mut self, report: FinancialReport) -> Result<()> {
        let idx = self
            .position(&report.id)
            .ok_or_else(|| AnalyzerError::UnknownReport(report.id.clone()))?;

        if let Some(field) = first_immutable_change(&self.reports[idx], &report) {
            return Err(AnalyzerError::ImmutableFieldMutation {
                id: report.id,
                field: field.to_string(),
            });
        }

        let id = report.id.clone();
        self.reports[idx] = report;
        self.commit(Transition::Updated(id));
        Ok(())
    }

    /// Removes a report. If it was active, the first remaining report becomes
    /// active (or none when the library is now empty).
    pub async fn delete(&mut self, id: &str) -> Result<FinancialReport> {
        let idx = self
            .position(id)
            .ok_or_else(|| AnalyzerError::UnknownReport(id.to_string()))?;

        let removed = self.reports.remove(idx);
        let previous_active = self.active_id.clone();
        if self.active_id.as_deref() == Some(id) {
            self.active_id = self.reports.first().map(|r| r.id.clone());
        }
        let was_dirty = std::mem::replace(&mut self.dirty, true);

        if let Err(e) = self.flush().await {
            warn!("Could not persist deletion of {}: {}", id, e);
            self.reports.insert(idx, removed);
            self.active_id = previous_active;
            self.dirty = was_dirty;
            return Err(e);
        }

        info!("Deleted report {}", id);
        self.notify(Transition::Deleted(id.to_string()));
        Ok(removed)
    }

    /// Selects the active report without reordering.
    pub fn set_active(&mut self, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            if self.position(id).is_none() {
                return Err(AnalyzerError::UnknownReport(id.to_string()));
            }
        }
        self.active_id = id.map(str::to_string);
        self.commit(Transition::ActiveChanged(self.active_id.clone()));
        Ok(())
    }

    pub fn set_dark_mode(&mut self, enabled: bool) {
        self.dark_mode = enabled;
        self.commit(Transition::ThemeChanged(enabled));
    }

    pub fn toggle_dark_mode(&mut self) -> bool {
        self.set_dark_mode(!self.dark_mode);
        self.dark_mode
    }

    pub fn is_dark_mode(&self) -> bool {
        self.dark_mode
    }

    pub fn get(&self, id: &str) -> Option<&FinancialReport> {
        self.reports.iter().find(|r| r.id == id)
    }

    /// Newest first.
    pub fn list(&self) -> &[FinancialReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active(&self) -> Option<&FinancialReport> {
        self.active_id.as_deref().and_then(|id| self.get(id))
    }

    /// Case-insensitive match on company name or ticker; an empty query
    /// matches everything.
    pub fn search(&self, query: &str) -> Vec<&FinancialReport> {
        let needle = query.trim().to_lowercase();
        self.reports
            .iter()
            .filter(|r| {
                r.company_name.to_lowercase().contains(&needle)
                    || r.ticker.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&LibrarySnapshot) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            reports: self.reports.clone(),
            active_report_id: self.active_id.clone(),
            is_dark_mode: self.dark_mode,
            extra: self.extra.clone(),
        }
    }

    /// Writes pending state, if any. Returns whether a write happened.
    pub async fn flush(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        let blob = serde_json::to_string(&self.persisted_state())?;
        self.store.set(&self.key, &blob).await?;
        self.dirty = false;
        debug!(
            "Persisted {} reports ({} bytes) under '{}'",
            self.reports.len(),
            blob.len(),
            self.key
        );
        Ok(true)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.reports.iter().position(|r| r.id == id)
    }

    fn commit(&mut self, transition: Transition) {
        self.dirty = true;
        self.notify(transition);
    }

    fn notify(&mut self, transition: Transition) {
        if self.observers.is_empty() {
            return;
        }
        let snapshot = LibrarySnapshot {
            transition,
            reports: self.reports.clone(),
            active_report_id: self.active_id.clone(),
            is_dark_mode: self.dark_mode,
        };
        for (_, observer) in self.observers.iter_mut() {
            observer(&snapshot);
        }
    }
}

fn same_number(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn same_optional(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => same_number(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Name of the first extracted field that differs, if any. Only the
/// enrichments and unknown passthrough fields may change after creation.
fn first_immutable_change(current: &FinancialReport, next: &FinancialReport) -> Option<&'static str> {
    let checks = [
        ("timestamp", current.timestamp == next.timestamp),
        ("companyName", current.company_name == next.company_name),
        ("ticker", current.ticker == next.ticker),
        ("reportType", current.report_type == next.report_type),
        ("reportPeriod", current.report_period == next.report_period),
        ("reportYear", current.report_year == next.report_year),
        ("revenue", same_number(current.revenue, next.revenue)),
        ("revenuePrior", same_number(current.revenue_prior, next.revenue_prior)),
        ("netIncome", same_number(current.net_income, next.net_income)),
        (
            "netIncomePrior",
            same_optional(current.net_income_prior, next.net_income_prior),
        ),
        ("eps", same_number(current.eps, next.eps)),
        ("epsPrior", same_optional(current.eps_prior, next.eps_prior)),
        ("grossMargin", same_number(current.gross_margin, next.gross_margin)),
        (
            "operatingMargin",
            same_number(current.operating_margin, next.operating_margin),
        ),
        ("netMargin", same_number(current.net_margin, next.net_margin)),
        ("sentimentScore", current.sentiment_score == next.sentiment_score),
        ("expenses", current.expenses == next.expenses),
        ("trends", current.trends == next.trends),
        ("highlights", current.highlights == next.highlights),
        (
            "managementCommentary",
            current.management_commentary == next.management_commentary,
        ),
    ];

    checks
        .iter()
        .find(|(_, unchanged)| !unchanged)
        .map(|(field, _)| *field)
}
