//! Property tests over generated snapshots.

use std::collections::BTreeSet;

use oxide_schema::prelude::*;
use proptest::prelude::*;

const TABLES: [&str; 5] = ["users", "posts", "comments", "tags", "Users"];
const FIELDS: [&str; 5] = ["id", "title", "body", "owner_id", "created_at"];

fn arb_field_type() -> impl Strategy<Value = FieldType> {
    prop_oneof![
        Just(FieldType::Text),
        Just(FieldType::Number),
        Just(FieldType::Boolean),
        Just(FieldType::Object),
        Just(FieldType::Date),
        Just(FieldType::DateTime),
        Just(FieldType::Uuid),
        "[a-z]{3,8}".prop_map(FieldType::Other),
    ]
}

fn arb_condition() -> impl Strategy<Value = Condition> {
    prop_oneof![
        any::<bool>().prop_map(Condition::Literal),
        Just(Condition::Expr(Expr::equals(
            Expr::field("id"),
            Expr::var("auth.uid")
        ))),
    ]
}

fn arb_field(name: &'static str) -> impl Strategy<Value = Field> {
    (arb_field_type(), any::<bool>()).prop_map(move |(field_type, nullable)| {
        let field = Field::new(name, field_type);
        if nullable {
            field
        } else {
            field.not_null()
        }
    })
}

// Every table has `id`, which the generated conditions refer to.
fn arb_table(name: &'static str) -> impl Strategy<Value = Table> {
    let fields = prop::collection::btree_set(1..FIELDS.len(), 0..FIELDS.len());
    let access = (
        arb_condition(),
        arb_condition(),
        arb_condition(),
        arb_condition(),
    );
    (fields, access).prop_flat_map(move |(indices, (read, create, update, delete))| {
        let fields: Vec<_> = std::iter::once(0)
            .chain(indices)
            .map(|i| arb_field(FIELDS[i]))
            .collect();
        let access_control = AccessControl {
            read,
            create,
            update,
            delete,
        };
        fields.prop_map(move |fields| Table {
            name: name.to_string(),
            fields,
            access_control: access_control.clone(),
        })
    })
}

fn arb_snapshot() -> impl Strategy<Value = Snapshot> {
    prop::collection::btree_set(0..TABLES.len(), 0..=TABLES.len()).prop_flat_map(|indices| {
        let tables: Vec<_> = indices.into_iter().map(|i| arb_table(TABLES[i])).collect();
        tables.prop_map(|tables| Snapshot { tables })
    })
}

fn names(snapshot: &Snapshot) -> BTreeSet<String> {
    snapshot.table_names().map(str::to_string).collect()
}

proptest! {
    #[test]
    fn diff_with_self_is_empty(snapshot in arb_snapshot()) {
        let diff = diff_snapshots(&snapshot, &snapshot);
        prop_assert!(diff.is_empty());
    }

    #[test]
    fn table_names_partition(old in arb_snapshot(), new in arb_snapshot()) {
        let diff = diff_snapshots(&old, &new);
        let added: BTreeSet<String> = diff.tables.added.iter().map(|t| t.name.clone()).collect();
        let removed: BTreeSet<String> =
            diff.tables.removed.iter().map(|t| t.name.clone()).collect();
        let old_names = names(&old);
        let new_names = names(&new);
        let common: BTreeSet<String> = old_names.intersection(&new_names).cloned().collect();

        prop_assert!(added.is_disjoint(&removed));
        prop_assert!(added.is_disjoint(&common));
        prop_assert!(removed.is_disjoint(&common));

        let rebuilt: BTreeSet<String> =
            added.iter().chain(&common).chain(&removed).cloned().collect();
        let union: BTreeSet<String> = old_names.union(&new_names).cloned().collect();
        prop_assert_eq!(rebuilt, union);

        for modification in &diff.tables.modified {
            prop_assert!(common.contains(&modification.table));
        }
    }

    #[test]
    fn bootstrap_equals_diff_from_empty(snapshot in arb_snapshot()) {
        let diff = diff_snapshots(&Snapshot::default(), &snapshot);
        for dialect in Dialect::ALL {
            let bootstrapped = bootstrap(&snapshot, dialect).unwrap();
            let synthesized = synthesize(&diff, &snapshot, dialect).unwrap();
            prop_assert_eq!(bootstrapped.statements, synthesized.statements);
        }
    }

    #[test]
    fn postgres_bootstrap_secures_every_table(snapshot in arb_snapshot()) {
        let migration = bootstrap(&snapshot, Dialect::Postgres).unwrap();
        for table in &snapshot.tables {
            let enable = format!("ALTER TABLE \"{}\" ENABLE ROW LEVEL SECURITY", table.name);
            prop_assert!(migration.statements.contains(&enable));
            let prefix = format!("CREATE POLICY \"{}_", table.name);
            let creates = migration
                .statements
                .iter()
                .filter(|s| s.starts_with(&prefix))
                .count();
            prop_assert_eq!(creates, 4);
        }
    }

    #[test]
    fn rebuild_is_four_statements(from in arb_field_type(), to in arb_field_type()) {
        prop_assume!(from != to);
        let old = Snapshot::new().table(Table::new("t").field(Field::new("c", from)));
        let new = Snapshot::new().table(Table::new("t").field(Field::new("c", to)));

        for dialect in [Dialect::Sqlite, Dialect::Libsql] {
            let migration = Synthesizer::new().migrate(&old, &new, dialect).unwrap();
            prop_assert_eq!(migration.statements.len(), 4);
            prop_assert!(migration.statements[0].contains("ADD COLUMN \"c__rebuild\""));
            prop_assert!(migration.statements[1].starts_with("UPDATE \"t\""));
            prop_assert!(migration.statements[2].ends_with("DROP COLUMN \"c\""));
            prop_assert!(migration.statements[3].contains("RENAME COLUMN \"c__rebuild\" TO \"c\""));
        }
    }
}
