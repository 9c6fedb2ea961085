use std::fmt;
use tracing::info;

/// §4.J states. Terminal states have no outgoing transition in normal
/// operation: VALIDATION_FAILED, DOCUMENTS_FETCH_FAILED, REJECTED_FILTER,
/// REJECTED_AI, COMPLETED, EXPORT_FAILED, ERROR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Received,
    Validating,
    ValidationFailed,
    FetchingDocuments,
    DocumentsNotFound,
    ScrapingDocuments,
    DocumentsFetchFailed,
    DocumentsSaved,
    Filtering,
    RejectedFilter,
    AiProcessing,
    RejectedAi,
    ReadyForExport,
    Exporting,
    Completed,
    ExportFailed,
    Error,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Received => "RECEIVED",
            State::Validating => "VALIDATING",
            State::ValidationFailed => "VALIDATION_FAILED",
            State::FetchingDocuments => "FETCHING_DOCUMENTS",
            State::DocumentsNotFound => "DOCUMENTS_NOT_FOUND",
            State::ScrapingDocuments => "SCRAPING_DOCUMENTS",
            State::DocumentsFetchFailed => "DOCUMENTS_FETCH_FAILED",
            State::DocumentsSaved => "DOCUMENTS_SAVED",
            State::Filtering => "FILTERING",
            State::RejectedFilter => "REJECTED_FILTER",
            State::AiProcessing => "AI_PROCESSING",
            State::RejectedAi => "REJECTED_AI",
            State::ReadyForExport => "READY_FOR_EXPORT",
            State::Exporting => "EXPORTING",
            State::Completed => "COMPLETED",
            State::ExportFailed => "EXPORT_FAILED",
            State::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            State::ValidationFailed
                | State::DocumentsFetchFailed
                | State::RejectedFilter
                | State::RejectedAi
                | State::Completed
                | State::ExportFailed
                | State::Error
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for State {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "RECEIVED" => State::Received,
            "VALIDATING" => State::Validating,
            "VALIDATION_FAILED" => State::ValidationFailed,
            "FETCHING_DOCUMENTS" => State::FetchingDocuments,
            "DOCUMENTS_NOT_FOUND" => State::DocumentsNotFound,
            "SCRAPING_DOCUMENTS" => State::ScrapingDocuments,
            "DOCUMENTS_FETCH_FAILED" => State::DocumentsFetchFailed,
            "DOCUMENTS_SAVED" => State::DocumentsSaved,
            "FILTERING" => State::Filtering,
            "REJECTED_FILTER" => State::RejectedFilter,
            "AI_PROCESSING" => State::AiProcessing,
            "REJECTED_AI" => State::RejectedAi,
            "READY_FOR_EXPORT" => State::ReadyForExport,
            "EXPORTING" => State::Exporting,
            "COMPLETED" => State::Completed,
            "EXPORT_FAILED" => State::ExportFailed,
            "ERROR" => State::Error,
            other => anyhow::bail!("unknown tender state: {other}"),
        })
    }
}

/// Named triggers for the §4.J transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    StartValidating,
    FailValidation,
    FetchDocuments,
    DocumentsNotFound,
    SaveDocuments,
    StartScraping,
    FailScraping,
    FinishScraping,
    StartFiltering,
    RejectAfterFiltering,
    StartAi,
    RejectAfterAi,
    PrepareExport,
    StartExporting,
    Complete,
    FailExport,
    EncounterError,
}

impl Trigger {
    fn name(&self) -> &'static str {
        match self {
            Trigger::StartValidating => "start_validating",
            Trigger::FailValidation => "fail_validation",
            Trigger::FetchDocuments => "fetch_documents",
            Trigger::DocumentsNotFound => "documents_not_found",
            Trigger::SaveDocuments => "save_documents",
            Trigger::StartScraping => "start_scraping",
            Trigger::FailScraping => "fail_scraping",
            Trigger::FinishScraping => "finish_scraping",
            Trigger::StartFiltering => "start_filtering",
            Trigger::RejectAfterFiltering => "reject_after_filtering",
            Trigger::StartAi => "start_ai",
            Trigger::RejectAfterAi => "reject_after_ai",
            Trigger::PrepareExport => "prepare_export",
            Trigger::StartExporting => "start_exporting",
            Trigger::Complete => "complete",
            Trigger::FailExport => "fail_export",
            Trigger::EncounterError => "encounter_error",
        }
    }
}

/// Per-tender driver over the §4.J transition table. Holds the state
/// in-memory only; the caller is responsible for persisting `state()`
/// after every successful `fire`, matching the original's
/// `update_tender_state` call after each transition.
pub struct TenderStateMachine {
    tender_id: String,
    state: State,
}

impl TenderStateMachine {
    /// Seeded with the persisted state on load; new tenders start at RECEIVED.
    pub fn new(tender_id: impl Into<String>, initial: State) -> Self {
        Self {
            tender_id: tender_id.into(),
            state: initial,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// `encounter_error` is legal from any state ("*" in the table); every
    /// other trigger is legal from exactly one source state.
    fn legal_transition(&self, trigger: Trigger) -> Option<State> {
        use State::*;
        use Trigger::*;
        if trigger == EncounterError {
            return Some(Error);
        }
        match (self.state, trigger) {
            (Received, StartValidating) => Some(Validating),
            (Validating, FailValidation) => Some(ValidationFailed),
            (Validating, FetchDocuments) => Some(FetchingDocuments),
            (FetchingDocuments, DocumentsNotFound) => Some(State::DocumentsNotFound),
            (FetchingDocuments, SaveDocuments) => Some(DocumentsSaved),
            (State::DocumentsNotFound, StartScraping) => Some(ScrapingDocuments),
            (ScrapingDocuments, FailScraping) => Some(DocumentsFetchFailed),
            (ScrapingDocuments, FinishScraping) => Some(DocumentsSaved),
            (DocumentsSaved, StartFiltering) => Some(Filtering),
            (Filtering, RejectAfterFiltering) => Some(RejectedFilter),
            (Filtering, StartAi) => Some(AiProcessing),
            (AiProcessing, RejectAfterAi) => Some(RejectedAi),
            (AiProcessing, PrepareExport) => Some(ReadyForExport),
            (ReadyForExport, StartExporting) => Some(Exporting),
            (Exporting, Complete) => Some(Completed),
            (Exporting, FailExport) => Some(ExportFailed),
            _ => None,
        }
    }

    /// Attempt the named transition. On success, mutates in-memory state
    /// and logs an entry named for the destination state; the caller must
    /// still persist it. On an illegal transition, returns an error and
    /// leaves state unchanged.
    pub fn fire(&mut self, trigger: Trigger) -> anyhow::Result<State> {
        match self.legal_transition(trigger) {
            Some(next) => {
                self.state = next;
                info!(
                    "Tender {} entered state {} (trigger: {})",
                    self.tender_id,
                    next,
                    trigger.name()
                );
                Ok(next)
            }
            None => anyhow::bail!(
                "illegal transition '{}' from state {} for tender {}",
                trigger.name(),
                self.state,
                self.tender_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_sequence_reaches_completed() {
        let mut sm = TenderStateMachine::new("T1", State::Received);
        sm.fire(Trigger::StartValidating).unwrap();
        sm.fire(Trigger::FetchDocuments).unwrap();
        sm.fire(Trigger::SaveDocuments).unwrap();
        sm.fire(Trigger::StartFiltering).unwrap();
        sm.fire(Trigger::StartAi).unwrap();
        sm.fire(Trigger::PrepareExport).unwrap();
        sm.fire(Trigger::StartExporting).unwrap();
        sm.fire(Trigger::Complete).unwrap();
        assert_eq!(sm.state(), State::Completed);
        assert!(sm.state().is_terminal());
    }

    #[test]
    fn scrape_fallback_sequence() {
        let mut sm = TenderStateMachine::new("T2", State::Received);
        sm.fire(Trigger::StartValidating).unwrap();
        sm.fire(Trigger::FetchDocuments).unwrap();
        sm.fire(Trigger::DocumentsNotFound).unwrap();
        sm.fire(Trigger::StartScraping).unwrap();
        sm.fire(Trigger::FinishScraping).unwrap();
        assert_eq!(sm.state(), State::DocumentsSaved);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut sm = TenderStateMachine::new("T3", State::Received);
        assert!(sm.fire(Trigger::StartFiltering).is_err());
        assert_eq!(sm.state(), State::Received);
    }

    #[test]
    fn encounter_error_legal_from_any_state() {
        for start in [State::Received, State::Filtering, State::Exporting] {
            let mut sm = TenderStateMachine::new("Tx", start);
            assert_eq!(sm.fire(Trigger::EncounterError).unwrap(), State::Error);
        }
    }
}
