//! Integration tests for complete statements: lists, object loads,
//! reference values, DDL and DML.

use insta::assert_snapshot;
use tabula::model::{
    Argument, Entity, Field, FieldPath, FieldType, Function, ModelRegistry, Relation, SortOrder,
};
use tabula::sql::{Archive, CreateTable, Insert, ListContext, LookupFilter, Update};
use tabula::{CompileError, ModelReferenceError, StatementAssembler, StatementKind};

fn geography() -> ModelRegistry {
    ModelRegistry::new()
        .with_entity(Entity::new("Country").with_field(Field::text("name").listed()))
        .with_entity(
            Entity::new("City")
                .with_field(Field::text("name").listed())
                .with_field(Field::reference("country", FieldPath::new("Country", "name")).listed()),
        )
        .with_entity(
            Entity::new("Shop")
                .with_field(Field::text("code").listed())
                .with_field(Field::reference("city", FieldPath::new("City", "country")).listed())
                .with_field(Field::new("opened", FieldType::Date))
                .with_relation(Relation::new("sales", FieldPath::new("Sale", "shop")))
                .with_field(Field::computed(
                    "revenue",
                    Function::new("Sum", vec![Argument::cross("sales", "amount")]),
                )),
        )
        .with_entity(
            Entity::new("Sale")
                .with_field(Field::reference("shop", FieldPath::new("Shop", "code")))
                .with_field(Field::new("amount", FieldType::Real)),
        )
}

#[test]
fn test_list_query_dereferences_two_hops() {
    let model = geography();
    let assembler = StatementAssembler::new(&model);
    let shop = model.entity("Shop").unwrap();
    let statement = assembler
        .build_list_query(
            shop,
            None,
            None,
            Some(&SortOrder::asc(FieldPath::new("Country", "name"))),
        )
        .unwrap();
    assert_snapshot!(
        statement.sql,
        @"SELECT [Shops].Id,[Shops].[code],[Shop_city_country].[name] FROM [Shops] INNER JOIN [Citys] [Shop_city] ON [Shop_city].Id = [Shops].[city] INNER JOIN [Countrys] [Shop_city_country] ON [Shop_city_country].Id = [Shop_city].[country] WHERE ([Shops]._archived IS NULL) AND ([Shops].[code] LIKE @name OR [Shop_city_country].[name] LIKE @name) ORDER BY [Shop_city_country].[name] ASC"
    );
    assert_eq!(statement.params, vec!["@name".to_string()]);
}

#[test]
fn test_list_query_skips_computed_fields() {
    let model = geography().with_entity(
        Entity::new("Sale")
            .with_field(Field::new("amount", FieldType::Real).listed())
            .with_field(
                Field::computed(
                    "doubled",
                    Function::new("Mul", vec![Argument::field("amount"), Argument::field("amount")]),
                )
                .listed(),
            ),
    );
    let assembler = StatementAssembler::new(&model);
    let sale = model.entity("Sale").unwrap();
    let statement = assembler.build_list_query(sale, None, None, None).unwrap();
    assert_snapshot!(
        statement.sql,
        @"SELECT [Sales].Id,[Sales].[amount] FROM [Sales] WHERE ([Sales]._archived IS NULL) AND ([Sales].[amount] LIKE @name)"
    );
}

#[test]
fn test_list_query_with_context_and_lookup() {
    let model = geography();
    let assembler = StatementAssembler::new(&model);
    let city = model.entity("City").unwrap();
    let statement = assembler
        .build_list_query(
            city,
            Some(&ListContext::new("country", 4)),
            Some(&LookupFilter::new("name")),
            None,
        )
        .unwrap();
    assert!(statement
        .sql
        .ends_with("AND [Citys].[country] = 4 AND [Citys].[name] = @lookup"));
    assert_eq!(statement.params, vec!["@name".to_string(), "@lookup".to_string()]);
}

#[test]
fn test_object_query_with_reference_chain_and_aggregate() {
    let model = geography();
    let assembler = StatementAssembler::new(&model);
    let shop = model.entity("Shop").unwrap();
    let statement = assembler.build_object_query(shop).unwrap();
    assert_snapshot!(
        statement.sql,
        @"SELECT [Shops].Id,[Shops].[code],[Shops].[city],[Shop_city]._archived,[Shop_city_country].[name],[Shops].[opened],uuidamountShoprevenue.uuidamountShoprevenue FROM [Shops],(SELECT COALESCE(SUM([Sales].amount),0) uuidamountShoprevenue FROM [Sales] INNER JOIN [Shops] ON [Sales].[shop]=[Shops].[Id] WHERE [Shops].Id=@id) uuidamountShoprevenue INNER JOIN [Citys] [Shop_city] ON [Shop_city].Id = [Shops].[city] INNER JOIN [Countrys] [Shop_city_country] ON [Shop_city_country].Id = [Shop_city].[country] WHERE [Shops].Id = @id"
    );
    assert_eq!(statement.params, vec!["@id".to_string()]);
}

#[test]
fn test_ref_value_query() {
    let model = geography();
    let assembler = StatementAssembler::new(&model);
    let shop = model.entity("Shop").unwrap();
    let city = shop.fields.get("city").unwrap();
    let statement = assembler.build_ref_value_query(shop, city).unwrap();
    assert_snapshot!(
        statement.sql,
        @"SELECT [Shop_city_country].[name] FROM [Shops] INNER JOIN [Citys] [Shop_city] ON [Shop_city].Id = [Shops].[city] INNER JOIN [Countrys] [Shop_city_country] ON [Shop_city_country].Id = [Shop_city].[country] WHERE [Shops].[Id] = @id"
    );
}

#[test]
fn test_dangling_listed_reference_names_the_statement() {
    let model = ModelRegistry::new().with_entity(
        Entity::new("Shop")
            .with_field(Field::reference("city", FieldPath::new("City", "name")).listed()),
    );
    let assembler = StatementAssembler::new(&model);
    let err = assembler
        .build_list_query(model.entity("Shop").unwrap(), None, None, None)
        .unwrap_err();
    assert_eq!(err.statement, StatementKind::ListQuery);
    assert_eq!(err.entity, "Shop");
    assert_eq!(
        err.source,
        CompileError::Reference(ModelReferenceError::UnknownEntity("City".to_string()))
    );
}

#[test]
fn test_ddl_and_dml_for_entity() {
    let model = geography();
    let shop = model.entity("Shop").unwrap();
    assert_snapshot!(
        CreateTable::for_entity(shop).to_sql(),
        @"CREATE TABLE [Shops](Id INTEGER PRIMARY KEY, _archived INTEGER, [code] TEXT, [city] INTEGER, [opened] INTEGER)"
    );
    assert_snapshot!(
        Insert::for_entity(shop).to_statement().sql,
        @"INSERT INTO [Shops]([code],[city],[opened]) VALUES (@code,@city,@opened)"
    );
    assert_snapshot!(
        Update::for_entity(shop).to_statement().sql,
        @"UPDATE [Shops] SET [code]=@code,[city]=@city,[opened]=@opened WHERE Id = @id"
    );
    assert_snapshot!(
        Archive::for_entity(shop).to_statement().sql,
        @"UPDATE [Shops] SET _archived=1 WHERE Id = @id"
    );
}
