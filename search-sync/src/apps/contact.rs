//! Contacts.

use search_sync_repository::postgres::SourceQuery;
use search_sync_shared::{FieldMapping, IndexMapping, SourceRow};
use serde_json::{Map, Value};

use super::EntityDescriptor;
use crate::mapper::copy_columns;
use crate::mapper::dict_utils::{
    address_dict, adviser_dict_with_team, company_dict, computed_nested_id_name_dict,
    computed_nested_sector_dict, contact_or_adviser_dict, full_name,
};
use crate::mapper::fields::{
    address_field, company_field, contact_or_adviser_field, id_name_field, sector_field,
};

pub const DESCRIPTOR: EntityDescriptor = EntityDescriptor {
    name: "contact",
    mapping,
    mapper: to_document,
    source_query,
    search_fields: &[
        "id",
        "name",
        "name.trigram",
        "email",
        "job_title",
        "job_title.trigram",
        "company.name",
        "company.name.trigram",
    ],
    composite_filters: &[
        (
            "company_name",
            &[
                "company.name",
                "company.name.trigram",
                "company.trading_names",
                "company.trading_names.trigram",
            ],
        ),
        ("address_country", &["address.country.id"]),
    ],
    view_permissions: &["company.view_contact"],
    export_permission: Some("company.export_contact"),
};

const PLAIN_COLUMNS: &[&str] = &[
    "first_name",
    "last_name",
    "job_title",
    "email",
    "full_telephone_number",
    "primary",
    "address_same_as_company",
    "archived",
    "archived_on",
    "archived_reason",
    "created_on",
    "modified_on",
];

pub fn mapping() -> IndexMapping {
    IndexMapping::new()
        .field("id", FieldMapping::keyword())
        .field("name", FieldMapping::name_text())
        .field("first_name", FieldMapping::name_text())
        .field("last_name", FieldMapping::name_text())
        .field("job_title", FieldMapping::trigram_text())
        .field("email", FieldMapping::normalized_keyword())
        .field("full_telephone_number", FieldMapping::keyword())
        .field("primary", FieldMapping::boolean())
        .field("address_same_as_company", FieldMapping::boolean())
        .field("archived", FieldMapping::boolean())
        .field("archived_on", FieldMapping::date())
        .field("archived_reason", FieldMapping::text())
        .field("archived_by", contact_or_adviser_field(false))
        .field("adviser", contact_or_adviser_field(true))
        .field("created_by", contact_or_adviser_field(true))
        .field("created_on", FieldMapping::date())
        .field("modified_on", FieldMapping::date())
        .field("company", company_field())
        .field("company_sector", sector_field())
        .field("company_uk_region", id_name_field())
        .field("address", address_field())
}

pub fn to_document(row: &SourceRow) -> Map<String, Value> {
    let mut document = Map::new();
    copy_columns(row, &mut document, PLAIN_COLUMNS);

    document.insert("name".to_string(), Value::String(full_name(&row.data)));
    document.insert(
        "archived_by".to_string(),
        contact_or_adviser_dict(row.related("archived_by"), false),
    );
    document.insert(
        "adviser".to_string(),
        adviser_dict_with_team(row.related("adviser")),
    );
    document.insert(
        "created_by".to_string(),
        adviser_dict_with_team(row.related("created_by")),
    );
    document.insert("company".to_string(), company_dict(row.related("company")));
    document.insert(
        "company_sector".to_string(),
        computed_nested_sector_dict(&row.data, "company.sector"),
    );
    document.insert(
        "company_uk_region".to_string(),
        computed_nested_id_name_dict(&row.data, "company.uk_region"),
    );

    // Contacts sharing their company's address store the company's.
    let address = if row.bool("address_same_as_company") == Some(true) {
        address_dict(row.related("company"), "address")
    } else {
        address_dict(Some(&row.data), "address")
    };
    document.insert("address".to_string(), address);

    document
}

pub fn source_query() -> SourceQuery {
    SourceQuery {
        table: "company_contact".to_string(),
        primary_key: "id".to_string(),
        recency_column: Some("modified_on".to_string()),
        rows_sql: r#"
WITH adviser AS (
    SELECT a.id, to_jsonb(a) || jsonb_build_object('dit_team', to_jsonb(t)) AS doc
    FROM company_advisor a LEFT JOIN metadata_team t ON t.id = a.dit_team_id
)
SELECT ct.id,
       to_jsonb(ct)
       || jsonb_build_object(
            'archived_by', (SELECT doc FROM adviser WHERE adviser.id = ct.archived_by_id),
            'adviser', (SELECT doc FROM adviser WHERE adviser.id = ct.adviser_id),
            'created_by', (SELECT doc FROM adviser WHERE adviser.id = ct.created_by_id),
            'address_area', (SELECT to_jsonb(x) FROM metadata_administrativearea x WHERE x.id = ct.address_area_id),
            'address_country', (SELECT to_jsonb(x) FROM metadata_country x WHERE x.id = ct.address_country_id),
            'company', (
                SELECT to_jsonb(c) || jsonb_build_object(
                    'uk_region', (SELECT to_jsonb(r) FROM metadata_ukregion r WHERE r.id = c.uk_region_id),
                    'address_area', (SELECT to_jsonb(x) FROM metadata_administrativearea x WHERE x.id = c.address_area_id),
                    'address_country', (SELECT to_jsonb(x) FROM metadata_country x WHERE x.id = c.address_country_id),
                    'sector', (
                        SELECT to_jsonb(s) || jsonb_build_object('ancestors', COALESCE((
                            SELECT jsonb_agg(jsonb_build_object('id', p.id) ORDER BY p.level)
                            FROM metadata_sector p
                            WHERE p.tree_id = s.tree_id AND p.lft < s.lft AND p.rght > s.rght), '[]'::jsonb))
                        FROM metadata_sector s WHERE s.id = c.sector_id))
                FROM company_company c WHERE c.id = ct.company_id)
          ) AS row
FROM company_contact ct
WHERE ct.id = ANY($1)
"#
        .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn row(value: Value) -> SourceRow {
        SourceRow::from_value(Uuid::new_v4(), value)
    }

    #[test]
    fn test_document() {
        let document = to_document(&row(json!({
            "first_name": "Grace",
            "last_name": "Hopper",
            "email": "grace@example.com",
            "adviser": {"id": "a", "first_name": "Ada", "last_name": "L", "dit_team": null},
            "company": {
                "id": "c",
                "name": "Acme",
                "trading_names": [],
                "uk_region": {"id": "r", "name": "North"},
                "sector": {"id": "s", "name": "Tech", "ancestors": []}
            },
            "address_same_as_company": false,
            "address_1": "2 Side St"
        })));

        assert_eq!(document["name"], "Grace Hopper");
        assert_eq!(document["adviser"]["dit_team"], json!({}));
        assert_eq!(document["company"], json!({"id": "c", "name": "Acme", "trading_names": []}));
        assert_eq!(document["company_uk_region"], json!({"id": "r", "name": "North"}));
        assert_eq!(document["company_sector"]["name"], "Tech");
        assert_eq!(document["address"]["line_1"], "2 Side St");
        assert_eq!(document["archived_by"], Value::Null);
    }

    #[test]
    fn test_address_same_as_company() {
        let document = to_document(&row(json!({
            "first_name": "Grace",
            "address_same_as_company": true,
            "address_1": "ignored",
            "company": {"id": "c", "name": "Acme", "address_1": "1 Main St", "address_town": "Leeds"}
        })));

        assert_eq!(document["address"]["line_1"], "1 Main St");
        assert_eq!(document["address"]["town"], "Leeds");
    }

    #[test]
    fn test_contact_without_company() {
        let document = to_document(&row(json!({"first_name": "Solo", "company": null})));
        assert_eq!(document["company"], Value::Null);
        assert_eq!(document["company_sector"], Value::Null);
        assert_eq!(document["name"], "Solo");
    }

    #[test]
    fn test_document_fields_are_mapped() {
        let mapping = mapping();
        let document = to_document(&row(json!({})));
        for field in document.keys() {
            assert!(mapping.get(field).is_some(), "unmapped field {field}");
        }
    }
}
