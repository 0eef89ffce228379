//! Integration tests for the SQLite record store.
//!
//! Every test runs against a fresh in-memory database.

use indexmap::IndexMap;
use tabula::model::{
    Argument, Entity, Field, FieldPath, FieldType, Function, ModelRegistry, Relation, SortOrder,
};
use tabula::sql::{CellValue, ListContext, LookupFilter};
use tabula::store::{ListRequest, Lookup, Store, StoreError};

fn orders() -> ModelRegistry {
    ModelRegistry::new()
        .with_entity(
            Entity::new("Customer")
                .with_field(Field::text("name").listed())
                .with_field(Field::text("city"))
                .with_relation(Relation::new("orders", FieldPath::new("Order", "customer")))
                .with_field(
                    Field::computed(
                        "orderCount",
                        Function::new("Count", vec![Argument::cross("orders", "number")]),
                    )
                    .with_format("%.0f"),
                )
                .with_field(Field::computed(
                    "spent",
                    Function::new("Sum", vec![Argument::cross("orders", "total")]),
                )),
        )
        .with_entity(
            Entity::new("Order")
                .with_field(Field::text("number").listed())
                .with_field(Field::reference("customer", FieldPath::new("Customer", "name")).listed())
                .with_field(Field::new("day", FieldType::Date))
                .with_field(Field::new("paid", FieldType::Boolean))
                .with_field(Field::new("deposit", FieldType::Real))
                .with_relation(Relation::new("lines", FieldPath::new("OrderLine", "orderId")))
                .with_field(Field::computed(
                    "total",
                    Function::new("Sum", vec![Argument::cross("lines", "amount")]),
                ))
                .with_field(
                    Field::computed(
                        "lineCount",
                        Function::new("Count", vec![Argument::cross("lines", "orderId")]),
                    )
                    .with_format("%.0f"),
                )
                .with_field(Field::computed(
                    "due",
                    Function::new("Sub", vec![Argument::field("total"), Argument::field("deposit")]),
                )),
        )
        .with_entity(
            Entity::new("OrderLine")
                .with_field(Field::reference("orderId", FieldPath::new("Order", "number")))
                .with_field(Field::text("kind").listed())
                .with_field(Field::new("amount", FieldType::Real))
                .with_field(Field::computed(
                    "orderTotal",
                    Function::new("Get", vec![Argument::cross("orderId", "total")]),
                )),
        )
}

fn inputs(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

struct Fixture {
    store: Store,
    model: ModelRegistry,
    alice: i64,
    bob: i64,
    a1: i64,
    a2: i64,
    b1: i64,
}

impl Fixture {
    fn new() -> Self {
        let model = orders();
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.create_tables(&model).len(), 3);

        let save = |entity: &str, pairs: &[(&str, &str)]| {
            store.save(&model, entity, None, &inputs(pairs)).unwrap()
        };
        let alice = save("Customer", &[("name", "Alice"), ("city", "Paris")]);
        let bob = save("Customer", &[("name", "Bob"), ("city", "Rome")]);
        let a1 = save(
            "Order",
            &[("number", "A-1"), ("customer", &alice.to_string()), ("day", "2024-01-15"), ("paid", "X")],
        );
        let a2 = save("Order", &[("number", "A-2"), ("customer", &alice.to_string())]);
        let b1 = save("Order", &[("number", "B-1"), ("customer", &bob.to_string())]);
        for (order, kind, amount) in [(a1, "book", "10"), (a1, "pen", "6"), (a2, "ink", "4.5")] {
            save(
                "OrderLine",
                &[("orderId", &order.to_string()), ("kind", kind), ("amount", amount)],
            );
        }

        Self {
            store,
            model,
            alice,
            bob,
            a1,
            a2,
            b1,
        }
    }

    fn display(&self, entity: &str, id: i64, field: &str) -> String {
        let record = self.store.load(&self.model, entity, id).unwrap().unwrap();
        record.fields[field].display.clone()
    }

    fn line_ids(&self, order: i64) -> Vec<i64> {
        let request = ListRequest {
            context: Some(ListContext::new("orderId", order)),
            ..ListRequest::default()
        };
        self.store
            .list(&self.model, "OrderLine", &request)
            .unwrap()
            .into_iter()
            .map(|row| row.id)
            .collect()
    }

    fn numbers(&self, request: &ListRequest) -> Vec<String> {
        self.store
            .list(&self.model, "Order", request)
            .unwrap()
            .into_iter()
            .map(|row| row.values[0].clone())
            .collect()
    }
}

fn by_number() -> ListRequest {
    ListRequest {
        order: Some(SortOrder::asc(FieldPath::new("Order", "number"))),
        ..ListRequest::default()
    }
}

#[test]
fn test_insert_returns_increasing_ids() {
    let f = Fixture::new();
    assert!(f.alice > 0);
    assert!(f.bob > f.alice);
    assert!(f.b1 > f.a2 && f.a2 > f.a1);
}

#[test]
fn test_load_formats_every_field() {
    let f = Fixture::new();
    let record = f.store.load(&f.model, "Order", f.a1).unwrap().unwrap();
    assert_eq!(record.id, f.a1);

    let customer = &record.fields["customer"];
    assert_eq!(customer.display, "Alice");
    assert_eq!(customer.key, Some(f.alice));
    assert!(!customer.archived);

    assert_eq!(record.fields["number"].display, "A-1");
    assert_eq!(record.fields["day"].display, "2024-01-15");
    assert_eq!(record.fields["paid"].display, "X");
    assert_eq!(record.fields["total"].display, "16.00");
    assert_eq!(record.fields["lineCount"].display, "2");
}

#[test]
fn test_aggregates_over_no_rows() {
    let f = Fixture::new();
    assert_eq!(f.display("Order", f.b1, "total"), "0.00");
    assert_eq!(f.display("Order", f.b1, "lineCount"), "0");
    assert_eq!(f.display("Order", f.a2, "paid"), " ");
}

#[test]
fn test_empty_sum_is_zero_inside_arithmetic() {
    let f = Fixture::new();
    let c1 = f
        .store
        .save(
            &f.model,
            "Order",
            None,
            &inputs(&[("number", "C-1"), ("customer", &f.bob.to_string()), ("deposit", "2.5")]),
        )
        .unwrap();
    assert_eq!(f.display("Order", c1, "total"), "0.00");
    assert_eq!(f.display("Order", c1, "due"), "-2.50");
}

#[test]
fn test_get_of_aggregate_through_reference() {
    let f = Fixture::new();
    for line in f.line_ids(f.a1) {
        assert_eq!(f.display("OrderLine", line, "orderTotal"), "16.00");
    }
    let a2_lines = f.line_ids(f.a2);
    assert_eq!(a2_lines.len(), 1);
    let record = f.store.load(&f.model, "OrderLine", a2_lines[0]).unwrap().unwrap();
    assert_eq!(record.fields["orderTotal"].display, "4.50");
    assert_eq!(record.fields["orderId"].display, "A-2");
}

#[test]
fn test_cascading_aggregate() {
    let f = Fixture::new();
    assert_eq!(f.display("Customer", f.alice, "orderCount"), "2");
    assert_eq!(f.display("Customer", f.alice, "spent"), "20.50");
    assert_eq!(f.display("Customer", f.bob, "orderCount"), "1");
    assert_eq!(f.display("Customer", f.bob, "spent"), "0.00");
}

#[test]
fn test_load_missing_record() {
    let f = Fixture::new();
    assert!(f.store.load(&f.model, "Order", 999).unwrap().is_none());
    assert!(matches!(
        f.store.load(&f.model, "Invoice", 1),
        Err(StoreError::Reference(_))
    ));
}

#[test]
fn test_list_search_matches_referenced_values() {
    let f = Fixture::new();
    assert_eq!(f.numbers(&by_number()), vec!["A-1", "A-2", "B-1"]);

    let rows = f
        .store
        .list(&f.model, "Order", &ListRequest { search: "Bo".to_string(), ..by_number() })
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, f.b1);
    assert_eq!(rows[0].values, vec!["B-1".to_string(), "Bob".to_string()]);

    let alice = ListRequest {
        search: "lic".to_string(),
        ..by_number()
    };
    assert_eq!(f.numbers(&alice), vec!["A-1", "A-2"]);
}

#[test]
fn test_list_children_of_one_parent() {
    let f = Fixture::new();
    let request = ListRequest {
        context: Some(ListContext::new("orderId", f.a1)),
        order: Some(SortOrder::desc(FieldPath::new("OrderLine", "kind"))),
        ..ListRequest::default()
    };
    let kinds: Vec<_> = f
        .store
        .list(&f.model, "OrderLine", &request)
        .unwrap()
        .into_iter()
        .map(|row| row.values[0].clone())
        .collect();
    assert_eq!(kinds, vec!["pen", "book"]);
}

#[test]
fn test_update_changes_stored_values() {
    let f = Fixture::new();
    let id = f
        .store
        .save(
            &f.model,
            "Order",
            Some(f.a2),
            &inputs(&[("number", "A-2b"), ("customer", &f.bob.to_string())]),
        )
        .unwrap();
    assert_eq!(id, f.a2);
    assert_eq!(f.display("Order", f.a2, "number"), "A-2b");
    assert_eq!(f.display("Order", f.a2, "customer"), "Bob");
    assert_eq!(f.display("Customer", f.bob, "spent"), "4.50");
}

#[test]
fn test_archive_hides_rows_and_flags_references() {
    let f = Fixture::new();
    f.store.archive(&f.model, "Order", f.a2).unwrap();
    assert_eq!(f.numbers(&by_number()), vec!["A-1", "B-1"]);
    // Nested aggregates skip archived rows.
    assert_eq!(f.display("Customer", f.alice, "spent"), "16.00");

    f.store.archive(&f.model, "Customer", f.bob).unwrap();
    let record = f.store.load(&f.model, "Order", f.b1).unwrap().unwrap();
    assert!(record.fields["customer"].archived);
    assert_eq!(record.fields["customer"].display, "Bob");
}

#[test]
fn test_ref_value_follows_the_chain() {
    let f = Fixture::new();
    let line = f
        .store
        .list(
            &f.model,
            "OrderLine",
            &ListRequest {
                context: Some(ListContext::new("orderId", f.a2)),
                ..ListRequest::default()
            },
        )
        .unwrap()[0]
        .id;
    assert_eq!(
        f.store.ref_value(&f.model, "OrderLine", "orderId", line).unwrap(),
        Some("A-2".to_string())
    );
    assert_eq!(
        f.store.ref_value(&f.model, "Order", "customer", f.b1).unwrap(),
        Some("Bob".to_string())
    );
    assert_eq!(f.store.ref_value(&f.model, "Order", "customer", 999).unwrap(), None);
}

#[test]
fn test_invalid_inputs_are_rejected_before_writing() {
    let f = Fixture::new();
    let err = f
        .store
        .save(&f.model, "Order", None, &inputs(&[("number", "C-1"), ("day", "15.01.2024")]))
        .unwrap_err();
    assert!(matches!(err, StoreError::MalformedDate { .. }));
    assert_eq!(f.numbers(&by_number()).len(), 3);
}

// ============================================================================
// References to one entity
// ============================================================================

#[test]
fn test_two_references_to_one_entity_read_their_own_rows() {
    let model = ModelRegistry::new()
        .with_entity(Entity::new("Account").with_field(Field::text("name").listed()))
        .with_entity(
            Entity::new("Transfer")
                .with_field(Field::reference("source", FieldPath::new("Account", "name")).listed())
                .with_field(Field::reference("dest", FieldPath::new("Account", "name")).listed())
                .with_field(Field::new("amount", FieldType::Real)),
        );
    let store = Store::open_in_memory().unwrap();
    store.create_tables(&model);
    let save = |entity: &str, pairs: &[(&str, &str)]| {
        store.save(&model, entity, None, &inputs(pairs)).unwrap()
    };
    let alice = save("Account", &[("name", "alice")]);
    let bob = save("Account", &[("name", "bob")]);
    let transfer = save(
        "Transfer",
        &[("source", &alice.to_string()), ("dest", &bob.to_string()), ("amount", "5")],
    );

    let record = store.load(&model, "Transfer", transfer).unwrap().unwrap();
    assert_eq!(record.fields["source"].display, "alice");
    assert_eq!(record.fields["source"].key, Some(alice));
    assert_eq!(record.fields["dest"].display, "bob");
    assert_eq!(record.fields["dest"].key, Some(bob));

    let rows = store.list(&model, "Transfer", &ListRequest::default()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values, vec!["alice".to_string(), "bob".to_string()]);

    let by_dest = store.list(&model, "Transfer", &ListRequest::search("bo")).unwrap();
    assert_eq!(by_dest.len(), 1);
    assert_eq!(
        store.ref_value(&model, "Transfer", "dest", transfer).unwrap(),
        Some("bob".to_string())
    );
}

// ============================================================================
// Reference filters
// ============================================================================

fn catalog() -> ModelRegistry {
    ModelRegistry::new()
        .with_entity(Entity::new("Supplier").with_field(Field::text("name").listed()))
        .with_entity(
            Entity::new("Product")
                .with_field(Field::text("name").listed())
                .with_field(Field::reference("supplier", FieldPath::new("Supplier", "name"))),
        )
        .with_entity(
            Entity::new("Purchase")
                .with_field(Field::text("number").listed())
                .with_field(Field::reference("supplier", FieldPath::new("Supplier", "name"))),
        )
        .with_entity(
            Entity::new("PurchaseLine")
                .with_field(Field::reference("purchase", FieldPath::new("Purchase", "number")))
                .with_field(
                    Field::reference("product", FieldPath::new("Product", "name")).with_filter(
                        Function::new(
                            "RefEq",
                            vec![Argument::field("supplier"), Argument::cross("purchase", "supplier")],
                        ),
                    ),
                ),
        )
}

#[test]
fn test_lookup_filter_restricts_candidates() {
    let model = catalog();
    let store = Store::open_in_memory().unwrap();
    store.create_tables(&model);
    let save = |entity: &str, pairs: &[(&str, &str)]| store.save(&model, entity, None, &inputs(pairs)).unwrap();

    let acme = save("Supplier", &[("name", "Acme")]);
    let globex = save("Supplier", &[("name", "Globex")]);
    save("Product", &[("name", "Anvil"), ("supplier", &acme.to_string())]);
    save("Product", &[("name", "Rocket"), ("supplier", &acme.to_string())]);
    save("Product", &[("name", "Lamp"), ("supplier", &globex.to_string())]);
    let purchase = save("Purchase", &[("number", "P-1"), ("supplier", &acme.to_string())]);

    let mut form = IndexMap::new();
    assert_eq!(
        store
            .lookup_filter(&model, "PurchaseLine", "product", &form)
            .unwrap(),
        None
    );

    form.insert("purchase".to_string(), purchase);
    let lookup = store
        .lookup_filter(&model, "PurchaseLine", "product", &form)
        .unwrap()
        .unwrap();
    assert_eq!(
        lookup,
        Lookup {
            filter: LookupFilter::new("supplier"),
            value: CellValue::Integer(acme),
        }
    );

    let request = ListRequest {
        lookup: Some(lookup),
        order: Some(SortOrder::asc(FieldPath::new("Product", "name"))),
        ..ListRequest::default()
    };
    let names: Vec<_> = store
        .list(&model, "Product", &request)
        .unwrap()
        .into_iter()
        .map(|row| row.values[0].clone())
        .collect();
    assert_eq!(names, vec!["Anvil", "Rocket"]);

    assert_eq!(
        store.lookup_filter(&model, "PurchaseLine", "purchase", &form).unwrap(),
        None
    );
}
