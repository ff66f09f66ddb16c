use super::*;
use crate::status::RunMethod;
use crate::test_utils::{ids, migrations, TestUnit};
use chrono::TimeZone;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn assert_dependencies_first(sorted: &[Migration]) {
    for (pos, m) in sorted.iter().enumerate() {
        for dep in m.dependencies() {
            let dep_pos = sorted.iter().position(|d| d.id() == dep).unwrap();
            assert!(dep_pos < pos, "{} placed before its dependency {}", m.id(), dep);
        }
    }
}

#[test]
fn test_sort_up_respects_time_when_dependencies_agree() {
    let sorted = sort_up(migrations(&[("2", 3, &["1"]), ("1", 1, &[])])).unwrap();
    assert_eq!(ids(&sorted), vec!["1", "2"]);
}

#[test]
fn test_sort_up_moves_dependent_after_later_dependency() {
    let sorted = sort_up(migrations(&[("A", 5, &[]), ("B", 2, &["A"])])).unwrap();
    assert_eq!(ids(&sorted), vec!["A", "B"]);
}

#[test]
fn test_sort_up_stable_on_equal_times() {
    let sorted = sort_up(migrations(&[("x", 1, &[]), ("y", 1, &[]), ("z", 1, &[])])).unwrap();
    assert_eq!(ids(&sorted), vec!["x", "y", "z"]);
}

#[test]
fn test_sort_up_follows_most_recent_unresolved_dependency() {
    // 3 depends on 4 and 2; 4 is the latest, so 3 must land right after 4
    let sorted = sort_up(migrations(&[
        ("1", 1, &[]),
        ("2", 2, &[]),
        ("3", 3, &["4", "2"]),
        ("4", 4, &[]),
        ("5", 5, &[]),
    ]))
    .unwrap();

    assert_eq!(ids(&sorted), vec!["1", "2", "4", "3", "5"]);
    assert_dependencies_first(&sorted);
}

#[test]
fn test_sort_up_chained_dependencies_against_time() {
    let sorted = sort_up(migrations(&[
        ("c", 1, &["b"]),
        ("b", 2, &["a"]),
        ("a", 3, &[]),
        ("d", 4, &[]),
    ]))
    .unwrap();

    assert_eq!(ids(&sorted), vec!["a", "b", "c", "d"]);
    assert_dependencies_first(&sorted);
}

#[test]
fn test_sort_up_many_dependents_of_one_late_migration() {
    let sorted = sort_up(migrations(&[
        ("p", 1, &["base"]),
        ("q", 2, &["base"]),
        ("r", 3, &["q"]),
        ("base", 10, &[]),
        ("tail", 11, &[]),
    ]))
    .unwrap();

    assert_dependencies_first(&sorted);
    assert_eq!(sorted.len(), 5);
    assert_eq!(sorted[0].id(), "base");
}

/// Acyclic set of `n` migrations: dependencies only point at lower indices,
/// times are random and the input order is shuffled.
fn random_acyclic_set(rng: &mut StdRng, n: usize) -> Vec<Migration> {
    let density = [0.1, 0.3, 0.6][rng.gen_range(0..3)];
    let mut set = Vec::with_capacity(n);
    for i in 0..n {
        let mut deps = Vec::new();
        for d in 0..i {
            if rng.gen_bool(density) {
                deps.push(format!("m{d}"));
            }
        }
        let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
        let time = rng.gen_range(0..20);
        set.push(TestUnit::new(&format!("m{i}"), time).deps(&deps).into_migration());
    }
    set.shuffle(rng);
    set
}

#[test]
fn test_sort_up_places_dependencies_first_for_random_sets() {
    let mut rng = StdRng::seed_from_u64(0x0f10c);
    for _ in 0..500 {
        let n = rng.gen_range(1..=16);
        let sorted = sort_up(random_acyclic_set(&mut rng, n)).unwrap();

        assert_eq!(sorted.len(), n);
        assert_dependencies_first(&sorted);
    }
}

#[test]
fn test_sort_up_detects_cycle() {
    let result = sort_up(migrations(&[("a", 1, &["b"]), ("b", 2, &["a"])]));
    assert!(matches!(result, Err(CoreError::Cycle { .. })));
}

#[test]
fn test_sort_up_rejects_unknown_dependency() {
    let result = sort_up(migrations(&[("a", 1, &["nope"])]));
    assert!(matches!(result, Err(CoreError::Validation { .. })));
}

#[test]
fn test_sort_up_empty() {
    assert!(sort_up(Vec::new()).unwrap().is_empty());
}

#[test]
fn test_sort_down_most_recent_first_never_run_last() {
    let mut set = migrations(&[("old", 1, &[]), ("never", 2, &[]), ("new", 3, &[])]);
    let stamp = |m: &mut Migration, secs: i64| {
        let status = m.status_mut();
        status.run_method = Some(RunMethod::Up);
        status.run_time = Some(Utc.timestamp_opt(secs, 0).unwrap());
    };
    stamp(&mut set[0], 1_000);
    stamp(&mut set[2], 2_000);

    let sorted = sort_down(set);
    assert_eq!(ids(&sorted), vec!["new", "old", "never"]);
}
