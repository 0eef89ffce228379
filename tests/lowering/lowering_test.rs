//! Integration tests for lowering model files to a registry.

use tabula::dsl::{self, Severity};
use tabula::lowering::{self, LoweringError};
use tabula::model::{Argument, FieldPath, FieldType, SortOrder};

const ORDERS: &str = r#"
# Orders with their lines
app = application { title = "Order book"; }

Customer = entity {
    name = field { type: text; size: 30; listed: true; }
    orders = relation { ref: Order.customer; orderdesc: Order.day; }
}

Order = entity {
    number = field { size: 20; listed: true; }
    customer = field { ref: Customer.name; sortby: Customer.name; listed: true; }
    day = field { type: date; }
    lines = relation { ref: OrderLine.orderId; }
    lineCount = field { value: Count(lines.orderId); format: "%.0f"; }
    average = field { type: auto; value: Div(Sum(lines.amount), lineCount); }
}

OrderLine = entity {
    orderId = field { ref: Order.number; hidden: true; }
    amount = field { type: real; }
}

de = translation { number = "Nummer"; customer = "Kunde"; }
"#;

fn lower(source: &str) -> Result<lowering::Lowered, LoweringError> {
    let parsed = dsl::parse(source);
    assert!(parsed.is_ok(), "parse failed: {:?}", parsed.diagnostics);
    lowering::lower(&parsed.model.unwrap())
}

#[test]
fn test_lower_complete_model() {
    let lowered = lower(ORDERS).unwrap();
    assert!(lowered.warnings.is_empty());
    let model = lowered.registry;

    assert_eq!(model.title(), Some("Order book"));
    let names: Vec<_> = model.entities().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Customer", "Order", "OrderLine"]);

    let customer = model.entity("Customer").unwrap();
    let name = &customer.fields["name"];
    assert_eq!(name.field_type, FieldType::Text);
    assert_eq!(name.length, 30);
    assert!(name.listed);
    assert_eq!(
        customer.relations["orders"].order,
        Some(SortOrder::desc(FieldPath::new("Order", "day")))
    );

    let order = model.entity("Order").unwrap();
    assert_eq!(order.fields["number"].field_type, FieldType::Text);
    let link = &order.fields["customer"];
    assert_eq!(link.field_type, FieldType::Reference);
    assert_eq!(link.reference, Some(FieldPath::new("Customer", "name")));
    assert_eq!(link.sort, Some(SortOrder::asc(FieldPath::new("Customer", "name"))));

    let line_count = &order.fields["lineCount"];
    assert_eq!(line_count.field_type, FieldType::Computed);
    assert_eq!(line_count.format.as_deref(), Some("%.0f"));
    let average = order.fields["average"].formula.as_ref().unwrap();
    assert_eq!(average.to_string(), "Div(Sum(lines.amount), lineCount)");
    assert_eq!(average.args[1], Argument::field("lineCount"));

    assert!(model.entity("OrderLine").unwrap().fields["orderId"].hidden);
    assert_eq!(model.translate(Some("de"), "customer"), "Kunde");
}

#[test]
fn test_lowered_model_validates() {
    let model = lower(ORDERS).unwrap().registry;
    assert!(model.validate().is_empty());
}

#[test]
fn test_unknown_properties_are_warnings() {
    let source = "Tag = entity { label = field { colour: red; } }";
    let lowered = lower(source).unwrap();
    assert_eq!(lowered.warnings.len(), 1);
    let warning = &lowered.warnings[0];
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(&source[warning.span.clone()], "colour");
}

#[test]
fn test_type_conflicting_with_ref() {
    let source = "Order = entity { customer = field { type: text; ref: Customer.name; } }";
    assert!(matches!(
        lower(source),
        Err(LoweringError::ConflictingType {
            declared: FieldType::Text,
            implied: FieldType::Reference,
            ..
        })
    ));
}

#[test]
fn test_stored_field_after_computed_field() {
    let source = r#"
        Order = entity {
            lines = relation { ref: Line.orderId; }
            count = field { value: Count(lines.orderId); }
            note = field { type: text; }
        }
    "#;
    let err = lower(source).unwrap_err();
    assert!(matches!(err, LoweringError::PersistedAfterComputed { ref field, .. } if field == "note"));
    assert_eq!(&source[err.span()], "note");
}

#[test]
fn test_unknown_function_points_at_its_name() {
    let source = "Order = entity { m = field { value: Median(lines.amount); } }";
    let err = lower(source).unwrap_err();
    assert_eq!(&source[err.span()], "Median");
    assert_eq!(err.to_diagnostic().message, "unknown formula function 'Median'");
}

#[test]
fn test_wrong_arity_and_bad_values() {
    let source = "Order = entity { d = field { value: Div(a); } }";
    assert!(matches!(
        lower(source),
        Err(LoweringError::Arity {
            expected: 2,
            found: 1,
            ..
        })
    ));

    let source = "Order = entity { n = field { listed: yes; } }";
    assert!(matches!(
        lower(source),
        Err(LoweringError::InvalidValue { ref key, .. }) if key == "listed"
    ));

    let source = "Order = entity { n = field { size: wide; } }";
    assert!(matches!(lower(source), Err(LoweringError::InvalidSize { .. })));
}

#[test]
fn test_reference_filter() {
    let source = r#"
        OrderLine = entity {
            orderId = field { ref: Order.number; }
            product = field { ref: Product.name; filter: RefEq(supplier, orderId.supplier); }
        }
    "#;
    let model = lower(source).unwrap().registry;
    let filter = model.entity("OrderLine").unwrap().fields["product"]
        .filter
        .clone()
        .unwrap();
    assert_eq!(filter.name, "RefEq");
    assert_eq!(
        filter.args,
        vec![Argument::field("supplier"), Argument::cross("orderId", "supplier")]
    );

    let source = "Line = entity { p = field { ref: P.name; filter: Like(a, b.c); } }";
    assert!(matches!(lower(source), Err(LoweringError::UnknownFilter { .. })));
}

#[test]
fn test_load_reports_dangling_targets() {
    let result = lowering::load("Order = entity { customer = field { ref: Ghost.name; } }");
    assert!(!result.is_ok());
    let errors: Vec<_> = result.errors().collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("Ghost"));
}

#[test]
fn test_load_renders_diagnostics_with_source() {
    let source = "Order = entity { day = field { type: moment; } }";
    let result = lowering::load(source);
    assert!(result.registry.is_none());

    let mut out = Vec::new();
    result.diagnostics[0]
        .write_report("orders.model", source, &mut out)
        .unwrap();
    let rendered = String::from_utf8(out).unwrap();
    assert!(rendered.contains("unknown field type 'moment'"));
    assert!(rendered.contains("orders.model"));
}

#[test]
fn test_load_keeps_warnings_of_usable_models() {
    let result = lowering::load("app = application { subtitle = \"x\"; } Tag = entity { }");
    assert!(result.is_ok());
    assert_eq!(result.errors().count(), 0);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].severity, Severity::Warning);
}
