//! The policy evaluator: a pure function over `(key, operation, calendar,
//! attendees, interval) -> decision`, per spec §4.2. No I/O, no clock
//! reads beyond what's embedded in `EvaluationInput` — testable as plain
//! data in, data out, the way the teacher keeps `domains/*/effects`
//! (I/O) separate from pure model logic.

use chrono::Duration;

use super::types::{EvaluationInput, FieldResolution, PolicyDecision, Violation};
use crate::domains::api_keys::models::{ActionOverride, KeyConstraints, Tier};

/// Evaluate a write intent against tier defaults and, if present, the
/// key's constraints object. See spec §4.2 for the nine-step order this
/// function implements literally, including the final step's "otherwise
/// tier default" wording — which, read literally, means an explicit
/// `operation_overrides` entry of `Allow` has no effect beyond ensuring
/// the operation isn't denied outright (see `DESIGN.md`'s Open Question
/// notes: `Allow` can't escalate a `write`-tier key past its
/// require-approval default, only `require_approval` or `deny` change
/// the outcome away from the tier default).
pub fn evaluate(tier: Tier, constraints: Option<&KeyConstraints>, input: &EvaluationInput) -> PolicyDecision {
    // Fail closed: if we couldn't resolve the update's effective fields
    // against the current event, never risk evaluating stale/wrong data.
    if input.resolution == FieldResolution::FetchFailed {
        return PolicyDecision::RequireApproval;
    }

    let tier_default = match tier {
        Tier::Read => PolicyDecision::Deny(Violation::new(
            "tier",
            "read-tier keys cannot submit mutations",
        )),
        Tier::Write => PolicyDecision::RequireApproval,
        Tier::Admin => PolicyDecision::Allow,
    };

    let Some(constraints) = constraints else {
        return tier_default;
    };

    // Step 2: operation override. Deny terminates now; require_approval is
    // remembered for step 8; allow is recorded but, per the literal spec
    // text, never consulted again.
    let override_action = constraints.operation_override(input.operation);
    if override_action == Some(ActionOverride::Deny) {
        return PolicyDecision::Deny(Violation::new(
            "operation_override",
            "this operation is denied by key policy",
        ));
    }

    // Step 3: calendar allowlist.
    if !constraints.calendar_allowlist.is_empty()
        && !constraints
            .calendar_allowlist
            .iter()
            .any(|c| c == "*" || c == &input.calendar_id)
    {
        return PolicyDecision::Deny(Violation::new(
            "calendar_allowlist",
            format!("calendar '{}' is not in the key's allowlist", input.calendar_id),
        ));
    }

    // Step 4: max event duration.
    if let Some(max_minutes) = constraints.max_event_duration_minutes {
        if input.duration() > Duration::minutes(max_minutes) {
            return PolicyDecision::Deny(Violation::new(
                "max_event_duration",
                format!("event exceeds the key's max duration of {max_minutes} minutes"),
            ));
        }
    }

    // Step 5: max attendees.
    if let Some(max_attendees) = constraints.max_attendees {
        if input.attendees.len() as i32 > max_attendees {
            return PolicyDecision::Deny(Violation::new(
                "max_attendees",
                format!("event has more than the allowed {max_attendees} attendees"),
            ));
        }
    }

    // Step 6: attendee domains — deny or downgrade.
    let mut downgrade_to_require_approval = false;
    if !constraints.attendee_domain_allowlist.is_empty() {
        let has_external = input.attendees.iter().any(|attendee| {
            let domain = attendee.rsplit('@').next().unwrap_or_default();
            !constraints
                .attendee_domain_allowlist
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(domain))
        });
        if has_external {
            if !constraints.allow_external_attendees {
                return PolicyDecision::Deny(Violation::new(
                    "attendee_domain",
                    "one or more attendees are outside the allowed domains",
                ));
            }
            downgrade_to_require_approval = true;
        }
    }

    // Step 7: block all-day events.
    if constraints.block_all_day && input.is_all_day() {
        return PolicyDecision::Deny(Violation::new(
            "all_day_events",
            "all-day events are blocked for this key",
        ));
    }

    // Steps 8-9: override require_approval or a domain downgrade wins,
    // otherwise the tier default stands.
    if override_action == Some(ActionOverride::RequireApproval) || downgrade_to_require_approval {
        return PolicyDecision::RequireApproval;
    }

    tier_default
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::policy::Operation;
    use chrono::Utc;
    use std::collections::HashMap;

    fn input(attendees: Vec<&str>, minutes: i64) -> EvaluationInput {
        let start = Utc::now();
        EvaluationInput {
            operation: Operation::CreateEvent,
            calendar_id: "primary".to_string(),
            attendees: attendees.into_iter().map(String::from).collect(),
            start,
            end: start + Duration::minutes(minutes),
            resolution: FieldResolution::Resolved,
        }
    }

    #[test]
    fn read_tier_denies_writes_even_without_constraints() {
        let decision = evaluate(Tier::Read, None, &input(vec![], 30));
        assert!(decision.is_deny());
    }

    #[test]
    fn write_tier_requires_approval_by_default() {
        let decision = evaluate(Tier::Write, None, &input(vec![], 30));
        assert!(matches!(decision, PolicyDecision::RequireApproval));
    }

    #[test]
    fn admin_tier_allows_by_default() {
        let decision = evaluate(Tier::Admin, None, &input(vec![], 30));
        assert!(decision.is_allow());
    }

    #[test]
    fn deny_override_short_circuits() {
        let mut overrides = HashMap::new();
        overrides.insert("create_event".to_string(), ActionOverride::Deny);
        let constraints = KeyConstraints {
            operation_overrides: overrides,
            ..Default::default()
        };
        let decision = evaluate(Tier::Admin, Some(&constraints), &input(vec![], 30));
        assert!(decision.is_deny());
    }

    #[test]
    fn allow_override_does_not_escalate_write_tier() {
        let mut overrides = HashMap::new();
        overrides.insert("create_event".to_string(), ActionOverride::Allow);
        let constraints = KeyConstraints {
            operation_overrides: overrides,
            ..Default::default()
        };
        let decision = evaluate(Tier::Write, Some(&constraints), &input(vec![], 30));
        assert!(matches!(decision, PolicyDecision::RequireApproval));
    }

    #[test]
    fn calendar_not_in_allowlist_denies() {
        let constraints = KeyConstraints {
            calendar_allowlist: vec!["work".to_string()],
            ..Default::default()
        };
        let decision = evaluate(Tier::Admin, Some(&constraints), &input(vec![], 30));
        match decision {
            PolicyDecision::Deny(v) => assert_eq!(v.constraint, "calendar_allowlist"),
            _ => panic!("expected deny"),
        }
    }

    #[test]
    fn wildcard_calendar_allowlist_matches_anything() {
        let constraints = KeyConstraints {
            calendar_allowlist: vec!["*".to_string()],
            ..Default::default()
        };
        let decision = evaluate(Tier::Admin, Some(&constraints), &input(vec![], 30));
        assert!(decision.is_allow());
    }

    #[test]
    fn max_duration_exceeded_denies() {
        let constraints = KeyConstraints {
            max_event_duration_minutes: Some(60),
            ..Default::default()
        };
        let decision = evaluate(Tier::Admin, Some(&constraints), &input(vec![], 90));
        match decision {
            PolicyDecision::Deny(v) => assert_eq!(v.constraint, "max_event_duration"),
            _ => panic!("expected deny"),
        }
    }

    #[test]
    fn max_attendees_exceeded_denies() {
        let constraints = KeyConstraints {
            max_attendees: Some(2),
            ..Default::default()
        };
        let decision = evaluate(
            Tier::Admin,
            Some(&constraints),
            &input(vec!["a@x.com", "b@x.com", "c@x.com"], 30),
        );
        match decision {
            PolicyDecision::Deny(v) => assert_eq!(v.constraint, "max_attendees"),
            _ => panic!("expected deny"),
        }
    }

    #[test]
    fn external_attendee_denied_when_not_allowed() {
        let constraints = KeyConstraints {
            attendee_domain_allowlist: vec!["internal.com".to_string()],
            allow_external_attendees: false,
            ..Default::default()
        };
        let decision = evaluate(
            Tier::Admin,
            Some(&constraints),
            &input(vec!["a@internal.com", "b@external.com"], 30),
        );
        match decision {
            PolicyDecision::Deny(v) => assert_eq!(v.constraint, "attendee_domain"),
            _ => panic!("expected deny"),
        }
    }

    #[test]
    fn external_attendee_downgrades_when_allowed() {
        let constraints = KeyConstraints {
            attendee_domain_allowlist: vec!["internal.com".to_string()],
            allow_external_attendees: true,
            ..Default::default()
        };
        let decision = evaluate(
            Tier::Admin,
            Some(&constraints),
            &input(vec!["a@internal.com", "b@external.com"], 30),
        );
        assert!(matches!(decision, PolicyDecision::RequireApproval));
    }

    #[test]
    fn block_all_day_denies_24h_events() {
        let constraints = KeyConstraints {
            block_all_day: true,
            ..Default::default()
        };
        let decision = evaluate(Tier::Admin, Some(&constraints), &input(vec![], 24 * 60));
        match decision {
            PolicyDecision::Deny(v) => assert_eq!(v.constraint, "all_day_events"),
            _ => panic!("expected deny"),
        }
    }

    #[test]
    fn fetch_failure_fails_closed_regardless_of_tier() {
        let mut i = input(vec![], 30);
        i.resolution = FieldResolution::FetchFailed;
        let decision = evaluate(Tier::Admin, None, &i);
        assert!(matches!(decision, PolicyDecision::RequireApproval));
    }
}
