use super::*;

#[test]
fn test_connection_state_string() {
    let tests = vec![
        (ConnectionState::Unspecified, "Unspecified"),
        (ConnectionState::New, "New"),
        (ConnectionState::Checking, "Checking"),
        (ConnectionState::Connected, "Connected"),
        (ConnectionState::Completed, "Completed"),
        (ConnectionState::Failed, "Failed"),
        (ConnectionState::Disconnected, "Disconnected"),
        (ConnectionState::Closed, "Closed"),
    ];

    for (connection_state, expected_string) in tests {
        assert_eq!(expected_string, connection_state.to_string());
    }
}

#[test]
fn test_connection_state_terminal() {
    assert!(ConnectionState::Failed.is_terminal());
    assert!(ConnectionState::Closed.is_terminal());
    assert!(!ConnectionState::Connected.is_terminal());
    assert!(!ConnectionState::New.is_terminal());
}

#[test]
fn test_gathering_state_string() {
    let tests = vec![
        (GatheringState::Unspecified, "unspecified"),
        (GatheringState::New, "new"),
        (GatheringState::Gathering, "gathering"),
        (GatheringState::Complete, "complete"),
    ];

    for (gathering_state, expected_string) in tests {
        assert_eq!(expected_string, gathering_state.to_string());
    }
}

#[test]
fn test_pair_state_string() {
    let tests = vec![
        (PairState::Frozen, "frozen"),
        (PairState::Waiting, "waiting"),
        (PairState::InProgress, "in-progress"),
        (PairState::Succeeded, "succeeded"),
        (PairState::Failed, "failed"),
    ];

    for (pair_state, expected_string) in tests {
        assert_eq!(expected_string, pair_state.to_string());
    }
}
