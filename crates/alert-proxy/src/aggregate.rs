//! Aggregator: combines per-alert outcomes into the single response the
//! pipeline returns. Pure function over already-computed outcomes; no I/O.

use std::time::Duration;

use chrono::Utc;

use crate::model::{
    AlertOutcome, AlertOutcomeStatus, Counts, OverallStatus, PublishCounts, Response,
};

#[must_use]
pub fn aggregate(
    received: usize,
    outcomes: Vec<AlertOutcome>,
    processing_time: Duration,
    request_id: String,
) -> Response {
    let mut counts = Counts {
        received,
        ..Counts::default()
    };
    let mut publish_counts = PublishCounts::default();

    for outcome in &outcomes {
        match outcome.status {
            AlertOutcomeStatus::Success | AlertOutcomeStatus::Partial => counts.processed += 1,
            AlertOutcomeStatus::Filtered => counts.filtered += 1,
            AlertOutcomeStatus::Failed => counts.failed += 1,
        }
        if outcome.classification.is_some() {
            counts.classified += 1;
        }
        if !matches!(outcome.status, AlertOutcomeStatus::Filtered) {
            counts.published += outcome
                .publish_outcomes
                .iter()
                .filter(|p| p.success)
                .count();
        }
        publish_counts.targets += outcome.publish_outcomes.len();
        publish_counts.success += outcome.publish_outcomes.iter().filter(|p| p.success).count();
        publish_counts.failed += outcome.publish_outcomes.iter().filter(|p| !p.success).count();
        publish_counts.total_publish_time += outcome
            .publish_outcomes
            .iter()
            .map(|p| p.duration)
            .sum::<Duration>();
    }

    let overall_status = overall_status(&outcomes);
    let message = match overall_status {
        OverallStatus::Success => "all alerts processed successfully".to_string(),
        OverallStatus::Partial => "some alerts or targets failed".to_string(),
        OverallStatus::Failed => "all alerts failed".to_string(),
    };

    Response {
        overall_status,
        message,
        timestamp: Utc::now(),
        processing_time,
        counts,
        publish_counts,
        alert_outcomes: outcomes,
        request_id,
    }
}

fn overall_status(outcomes: &[AlertOutcome]) -> OverallStatus {
    if outcomes.is_empty() {
        return OverallStatus::Success;
    }

    let all_failed = outcomes
        .iter()
        .all(|o| o.status == AlertOutcomeStatus::Failed);
    if all_failed {
        return OverallStatus::Failed;
    }

    let all_success_or_filtered = outcomes.iter().all(|o| {
        matches!(
            o.status,
            AlertOutcomeStatus::Success | AlertOutcomeStatus::Filtered
        )
    });
    let any_success = outcomes
        .iter()
        .any(|o| o.status == AlertOutcomeStatus::Success);
    let all_filtered = outcomes
        .iter()
        .all(|o| o.status == AlertOutcomeStatus::Filtered);

    if all_success_or_filtered && (any_success || all_filtered) {
        OverallStatus::Success
    } else {
        OverallStatus::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FilterAction;

    fn outcome(status: AlertOutcomeStatus) -> AlertOutcome {
        AlertOutcome {
            fingerprint: "f".to_string(),
            alert_name: "X".to_string(),
            status,
            classification: None,
            classification_time: None,
            filter_action: if status == AlertOutcomeStatus::Filtered {
                FilterAction::Deny
            } else {
                FilterAction::Allow
            },
            filter_reason: None,
            publish_outcomes: vec![],
            error_message: None,
        }
    }

    #[test]
    fn all_success_is_success() {
        let resp = aggregate(
            1,
            vec![outcome(AlertOutcomeStatus::Success)],
            Duration::ZERO,
            "r".to_string(),
        );
        assert_eq!(resp.overall_status, OverallStatus::Success);
    }

    #[test]
    fn all_filtered_is_success() {
        let resp = aggregate(
            1,
            vec![outcome(AlertOutcomeStatus::Filtered)],
            Duration::ZERO,
            "r".to_string(),
        );
        assert_eq!(resp.overall_status, OverallStatus::Success);
    }

    #[test]
    fn all_failed_is_failed() {
        let resp = aggregate(
            1,
            vec![outcome(AlertOutcomeStatus::Failed)],
            Duration::ZERO,
            "r".to_string(),
        );
        assert_eq!(resp.overall_status, OverallStatus::Failed);
    }

    #[test]
    fn mixed_is_partial() {
        let resp = aggregate(
            2,
            vec![
                outcome(AlertOutcomeStatus::Success),
                outcome(AlertOutcomeStatus::Failed),
            ],
            Duration::ZERO,
            "r".to_string(),
        );
        assert_eq!(resp.overall_status, OverallStatus::Partial);
    }

    #[test]
    fn counts_sum_to_received() {
        let resp = aggregate(
            3,
            vec![
                outcome(AlertOutcomeStatus::Success),
                outcome(AlertOutcomeStatus::Filtered),
                outcome(AlertOutcomeStatus::Failed),
            ],
            Duration::ZERO,
            "r".to_string(),
        );
        assert_eq!(
            resp.counts.processed + resp.counts.filtered + resp.counts.failed,
            resp.counts.received
        );
    }
}
