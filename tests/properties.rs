//! Randomized checks of revision and last-write-wins properties.
//!
//! Every test runs a seeded operation sequence so failures reproduce.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use autotrack::{Runtime, Tag, TrackedField};

const SEEDS: [u64; 4] = [1, 7, 42, 0xC0FFEE];
const STEPS: usize = 200;

#[test]
fn test_last_write_wins() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let runtime = Runtime::new();
        let fields: Vec<TrackedField<u64>> = (0..4)
            .map(|i| TrackedField::new(format!("f{i}")).unwrap())
            .collect();
        let objects: Vec<_> = (0..3).map(|_| runtime.create_object("Obj")).collect();
        let mut expected = vec![vec![0u64; fields.len()]; objects.len()];

        for _ in 0..STEPS {
            let o = rng.gen_range(0..objects.len());
            let f = rng.gen_range(0..fields.len());
            if rng.gen_bool(0.5) {
                let value = rng.gen();
                fields[f].set(&runtime, &objects[o], value);
                expected[o][f] = value;
            } else {
                assert_eq!(
                    *fields[f].get(&runtime, &objects[o]),
                    expected[o][f],
                    "seed {seed}"
                );
            }
        }
    }
}

#[test]
fn test_field_revisions_strictly_increase() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let runtime = Runtime::new();
        let fields: Vec<TrackedField<u8>> = (0..3)
            .map(|i| TrackedField::new(format!("f{i}")).unwrap())
            .collect();
        let object = runtime.create_object("Obj");
        let tags: Vec<Tag> = fields.iter().map(|f| f.tag(&runtime, &object)).collect();
        let mut last: Vec<_> = tags.iter().map(|t| runtime.revision(*t)).collect();

        for _ in 0..STEPS {
            let f = rng.gen_range(0..fields.len());
            if rng.gen_bool(0.3) {
                fields[f].get(&runtime, &object);
                assert_eq!(runtime.revision(tags[f]), last[f], "seed {seed}");
            } else {
                fields[f].set(&runtime, &object, rng.gen());
                let now = runtime.revision(tags[f]);
                assert!(now > last[f], "seed {seed}");
                last[f] = now;
            }
            for (tag, revision) in tags.iter().zip(&last) {
                assert_eq!(runtime.revision(*tag), *revision, "seed {seed}");
            }
        }
    }
}

#[test]
fn test_combined_revision_is_max() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let runtime = Runtime::new();
        let tags: Vec<Tag> = (0..6).map(|_| runtime.create_tag()).collect();

        let mut combos = Vec::new();
        for _ in 0..8 {
            let members: Vec<Tag> = tags
                .iter()
                .copied()
                .filter(|_| rng.gen_bool(0.5))
                .collect();
            combos.push((runtime.combine(members.iter().copied()), members));
        }

        for _ in 0..STEPS {
            runtime.bump(tags[rng.gen_range(0..tags.len())]);
            for (combined, members) in &combos {
                let max = members
                    .iter()
                    .map(|t| runtime.revision(*t))
                    .max()
                    .unwrap_or(0);
                assert_eq!(runtime.revision(*combined), max, "seed {seed}");
            }
        }
    }
}

#[test]
fn test_tracked_computation_invalidated_by_its_reads_only() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let runtime = Runtime::new();
        let cx = runtime.context();
        let fields: Vec<TrackedField<i64>> = (0..6)
            .map(|i| TrackedField::new(format!("f{i}")).unwrap())
            .collect();
        let object = runtime.create_object("Obj");

        for _ in 0..20 {
            let read: Vec<usize> = (0..fields.len()).filter(|_| rng.gen_bool(0.4)).collect();
            let (_, tag) = cx.track(|cx| {
                read.iter()
                    .map(|&i| *fields[i].get(cx, &object))
                    .sum::<i64>()
            });
            let snapshot = runtime.revision(tag);

            let written = rng.gen_range(0..fields.len());
            fields[written].set(&runtime, &object, rng.gen());

            assert_eq!(
                runtime.validate(tag, snapshot),
                !read.contains(&written),
                "seed {seed}"
            );
        }
    }
}
