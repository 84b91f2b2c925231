use pretty_assertions::assert_eq;

use crate::session::Sequencer;

#[test]
fn test_sequences_are_dense_from_one() {
    let mut sequencer = Sequencer::new();
    assert_eq!(0, sequencer.last_issued());
    assert_eq!(1, sequencer.next_sequence());

    assert_eq!(1, sequencer.assign());
    assert_eq!(2, sequencer.assign());
    assert_eq!(3, sequencer.assign());

    assert_eq!(3, sequencer.last_issued());
    assert_eq!(4, sequencer.next_sequence());
}

#[test]
fn test_a_number_is_never_issued_twice() {
    let mut sequencer = Sequencer::new();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..100 {
        assert!(seen.insert(sequencer.assign()));
    }
}
