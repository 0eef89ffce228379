//! Integration tests for the formula compiler.
//!
//! Models are built directly with the builder API so each test shows the
//! exact fragment a formula compiles to.

use insta::assert_snapshot;
use tabula::model::resolve::resolve_field;
use tabula::model::{
    Argument, Entity, Field, FieldPath, FieldType, Function, ModelRegistry, Relation,
};
use tabula::sql::QueryFragment;
use tabula::{CompileError, FormulaCompiler, ModelReferenceError};

fn call(name: &str, args: Vec<Argument>) -> Function {
    Function::new(name, args)
}

fn shop() -> ModelRegistry {
    ModelRegistry::new()
        .with_entity(
            Entity::new("Customer")
                .with_field(Field::text("name").listed())
                .with_relation(Relation::new("visits", FieldPath::new("Visit", "customer")))
                .with_field(Field::computed(
                    "points",
                    call("Sum", vec![Argument::cross("visits", "score")]),
                )),
        )
        .with_entity(
            Entity::new("Visit")
                .with_field(Field::reference("customer", FieldPath::new("Customer", "name")))
                .with_field(Field::new("score", FieldType::Integer)),
        )
        .with_entity(
            Entity::new("Order")
                .with_field(Field::text("number").listed())
                .with_field(Field::reference("customer", FieldPath::new("Customer", "name")))
                .with_field(Field::new("discount", FieldType::Real))
                .with_relation(Relation::new("lines", FieldPath::new("OrderLine", "orderId")))
                .with_field(Field::computed(
                    "total",
                    call("Sum", vec![Argument::cross("lines", "subtotal")]),
                ))
                .with_field(Field::computed(
                    "net",
                    call(
                        "Sub",
                        vec![
                            Argument::call(call("Sum", vec![Argument::cross("lines", "quantity")])),
                            Argument::field("discount"),
                        ],
                    ),
                ))
                .with_field(Field::computed(
                    "customerPoints",
                    call("Get", vec![Argument::cross("customer", "points")]),
                ))
                .with_field(Field::computed(
                    "lineList",
                    call("Get", vec![Argument::cross("lines", "quantity")]),
                )),
        )
        .with_entity(
            Entity::new("OrderLine")
                .with_field(Field::reference("orderId", FieldPath::new("Order", "number")))
                .with_field(Field::new("quantity", FieldType::Integer))
                .with_field(Field::new("price", FieldType::Real))
                .with_field(Field::computed(
                    "subtotal",
                    call("Mul", vec![Argument::field("quantity"), Argument::field("price")]),
                )),
        )
}

fn compile(model: &ModelRegistry, entity: &str, field: &str) -> Result<QueryFragment, CompileError> {
    let entity = model.entity(entity).unwrap();
    let field = resolve_field(entity, field).unwrap();
    FormulaCompiler::new(model).compile_field(entity, field)
}

#[test]
fn test_arithmetic_on_plain_columns_needs_no_subquery() {
    let model = shop();
    let fragment = compile(&model, "OrderLine", "subtotal").unwrap();
    assert_snapshot!(fragment.select, @"([OrderLines].quantity * [OrderLines].price)");
    assert!(fragment.from.is_empty());
    assert!(!fragment.correlated);
}

#[test]
fn test_sum_of_computed_child_value() {
    let model = shop();
    let fragment = compile(&model, "Order", "total").unwrap();
    assert_snapshot!(fragment.select, @"uuidsubtotalOrdertotal.uuidsubtotalOrdertotal");
    assert_snapshot!(
        fragment.from_clause(),
        @"(SELECT COALESCE(SUM(([OrderLines].quantity * [OrderLines].price)),0) uuidsubtotalOrdertotal FROM [OrderLines] INNER JOIN [Orders] ON [Orders].Id = [OrderLines].[orderId] WHERE [Orders].Id=@id) uuidsubtotalOrdertotal"
    );
}

#[test]
fn test_nested_aggregate_is_named_after_enclosing_field() {
    let model = shop();
    let fragment = compile(&model, "Order", "net").unwrap();
    assert_snapshot!(
        fragment.select,
        @"(uuidquantityOrdernet.uuidquantityOrdernet - [Orders].discount)"
    );
    assert_eq!(fragment.from.len(), 1);
    assert!(fragment.correlated);
}

#[test]
fn test_get_of_computed_value_through_reference() {
    let model = shop();
    let fragment = compile(&model, "Order", "customerPoints").unwrap();
    assert_snapshot!(
        fragment.select,
        @"(SELECT uuidscoreCustomerpoints.uuidscoreCustomerpoints FROM [Customers],(SELECT COALESCE(SUM([Visits].score),0) uuidscoreCustomerpoints FROM [Visits] INNER JOIN [Customers] ON [Visits].[customer]=[Customers].[Id] WHERE [Customers].Id=(SELECT [Orders].[customer] FROM [Orders] WHERE [Orders].Id=@id)) uuidscoreCustomerpoints WHERE [Customers].Id=(SELECT [Orders].[customer] FROM [Orders] WHERE [Orders].Id=@id))"
    );
    assert!(fragment.from.is_empty());
    assert_eq!(fragment.select.matches("[Orders]").count(), 2);
}

#[test]
fn test_relation_is_only_readable_through_aggregate() {
    let model = shop();
    assert!(matches!(
        compile(&model, "Order", "lineList"),
        Err(CompileError::InvalidArgument { position: 0, .. })
    ));
}

#[test]
fn test_computed_field_without_formula() {
    let model = ModelRegistry::new()
        .with_entity(Entity::new("Order").with_field(Field::new("total", FieldType::Computed)));
    assert_eq!(
        compile(&model, "Order", "total"),
        Err(CompileError::MissingFormula {
            entity: "Order".to_string(),
            field: "total".to_string(),
        })
    );
}

#[test]
fn test_dangling_relation_target() {
    let model = ModelRegistry::new().with_entity(
        Entity::new("Order")
            .with_relation(Relation::new("lines", FieldPath::new("Line", "orderId")))
            .with_field(Field::computed(
                "count",
                call("Count", vec![Argument::cross("lines", "orderId")]),
            )),
    );
    assert_eq!(
        compile(&model, "Order", "count"),
        Err(CompileError::Reference(ModelReferenceError::UnknownEntity(
            "Line".to_string()
        )))
    );
}

#[test]
fn test_compilation_does_not_depend_on_call_order() {
    let model = shop();
    let first = compile(&model, "Order", "total").unwrap();
    compile(&model, "Order", "net").unwrap();
    compile(&model, "Order", "customerPoints").unwrap();
    assert_eq!(compile(&model, "Order", "total").unwrap(), first);
}
