//! Execution ordering for `up` and `down`.
//!
//! `sort_up` keeps chronological order wherever dependencies allow and only
//! moves a migration when one of its dependencies has not been placed yet.
//! `sort_down` undoes the most recently applied migration first.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error::{CoreError, CoreResult};
use crate::graph::DependencyGraph;
use crate::migration::Migration;

/// Order migrations so every migration follows all of its dependencies.
///
/// Starts from a stable ascending sort on `time`, then walks the sequence:
/// a migration whose dependencies are all placed is appended to the output;
/// otherwise it is moved to sit right after its most recently timed
/// unresolved dependency and the walk continues at the same position.
///
/// Fails with [`CoreError::Cycle`] for cyclic dependencies and
/// [`CoreError::Validation`] for dependencies outside the set.
pub fn sort_up(mut migrations: Vec<Migration>) -> CoreResult<Vec<Migration>> {
    let graph = DependencyGraph::build(
        migrations
            .iter()
            .map(|m| (m.id(), m.dependencies())),
    )?;
    graph.validate()?;

    migrations.sort_by_key(|m| m.time());

    let n = migrations.len();
    let max_moves = n.saturating_mul(n).max(1);
    let mut moves = 0usize;
    let mut placed: HashSet<String> = HashSet::with_capacity(n);
    let mut i = 0;

    while i < migrations.len() {
        let unresolved = latest_unresolved_dependency(&migrations, i, &placed);

        match unresolved {
            None => {
                placed.insert(migrations[i].id().to_string());
                i += 1;
            }
            Some(dep_pos) => {
                moves += 1;
                if moves > max_moves {
                    return Err(CoreError::Cycle {
                        cycle: format!(
                            "gave up ordering after {} repositionings around {}",
                            max_moves,
                            migrations[i].id()
                        ),
                    });
                }
                // dep_pos > i, so after the removal the dependency sits at dep_pos - 1
                let migration = migrations.remove(i);
                migrations.insert(dep_pos, migration);
            }
        }
    }

    Ok(migrations)
}

/// Position of the most recently timed dependency of `migrations[i]` that has
/// not been placed yet, if any.
fn latest_unresolved_dependency(
    migrations: &[Migration],
    i: usize,
    placed: &HashSet<String>,
) -> Option<usize> {
    let current = &migrations[i];
    current
        .dependencies()
        .iter()
        .filter(|dep| !placed.contains(dep.as_str()))
        .filter_map(|dep| {
            migrations
                .iter()
                .enumerate()
                .skip(i + 1)
                .find(|(_, m)| m.id() == dep.as_str())
        })
        .max_by_key(|(pos, m)| (m.time(), *pos))
        .map(|(pos, _)| pos)
}

/// Order migrations by recorded run time, most recent first.
///
/// Migrations that never ran sort last. Ties keep their relative order.
pub fn sort_down(mut migrations: Vec<Migration>) -> Vec<Migration> {
    migrations.sort_by_key(|m| std::cmp::Reverse(run_time_or_epoch(m)));
    migrations
}

fn run_time_or_epoch(migration: &Migration) -> DateTime<Utc> {
    migration
        .status()
        .run_time
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
#[path = "sorter_test.rs"]
mod tests;
