//! Companies.

use search_sync_repository::postgres::SourceQuery;
use search_sync_shared::{FieldMapping, IndexMapping, SourceRow};
use serde_json::{Map, Value};

use super::EntityDescriptor;
use crate::mapper::dict_utils::{
    address_dict, adviser_dict_with_team, contact_or_adviser_dict, id_name_dict,
    id_name_list_of_dicts, sector_dict,
};
use crate::mapper::fields::{
    address_field, contact_or_adviser_field, id_name_field, id_name_partial_field, nested,
    sector_field,
};
use crate::mapper::{copy_columns, latest_related_value};

pub const DESCRIPTOR: EntityDescriptor = EntityDescriptor {
    name: "company",
    mapping,
    mapper: to_document,
    source_query,
    search_fields: &[
        "name",
        "name.trigram",
        "trading_names",
        "trading_names.trigram",
        "company_number",
        "reference_code",
        "address.line_1.trigram",
        "address.line_2.trigram",
        "address.town.trigram",
        "address.county.trigram",
        "address.postcode",
        "address.country.name.trigram",
        "registered_address.line_1.trigram",
        "registered_address.town.trigram",
        "registered_address.postcode",
    ],
    composite_filters: &[
        ("name", &["name", "name.trigram", "trading_names.trigram"]),
        ("area", &["address.area.id", "registered_address.area.id"]),
        ("country", &["address.country.id", "registered_address.country.id"]),
        ("uk_postcode", &["address.postcode", "registered_address.postcode"]),
    ],
    view_permissions: &["company.view_company"],
    export_permission: Some("company.export_company"),
};

const PLAIN_COLUMNS: &[&str] = &[
    "name",
    "trading_names",
    "company_number",
    "reference_code",
    "duns_number",
    "global_ultimate_duns_number",
    "vat_number",
    "website",
    "description",
    "number_of_employees",
    "is_global_ultimate",
    "uk_based",
    "archived",
    "archived_on",
    "archived_reason",
    "export_segment",
    "export_sub_segment",
    "created_on",
    "modified_on",
];

const ID_NAME_RELATIONS: &[&str] = &[
    "business_type",
    "employee_range",
    "turnover_range",
    "export_experience_category",
    "headquarter_type",
    "uk_region",
    "one_list_tier",
    "global_headquarters",
];

pub fn mapping() -> IndexMapping {
    let mut mapping = IndexMapping::new()
        .field("id", FieldMapping::keyword())
        .field("name", FieldMapping::name_text())
        .field("trading_names", FieldMapping::trigram_text())
        .field("company_number", FieldMapping::normalized_keyword())
        .field("reference_code", FieldMapping::normalized_keyword())
        .field("duns_number", FieldMapping::keyword())
        .field("global_ultimate_duns_number", FieldMapping::keyword())
        .field("vat_number", FieldMapping::keyword())
        .field("website", FieldMapping::text())
        .field("description", FieldMapping::english_text())
        .field("number_of_employees", FieldMapping::integer())
        .field("is_global_ultimate", FieldMapping::boolean())
        .field("uk_based", FieldMapping::boolean())
        .field("archived", FieldMapping::boolean())
        .field("archived_on", FieldMapping::date())
        .field("archived_reason", FieldMapping::text())
        .field("archived_by", contact_or_adviser_field(false))
        .field("export_segment", FieldMapping::text())
        .field("export_sub_segment", FieldMapping::text())
        .field("created_on", FieldMapping::date())
        .field("modified_on", FieldMapping::date())
        .field("latest_interaction_date", FieldMapping::date())
        .field("address", address_field())
        .field("registered_address", address_field())
        .field("sector", sector_field())
        .field("one_list_group_global_account_manager", contact_or_adviser_field(true))
        .field("export_to_countries", nested(id_name_partial_field()))
        .field("future_interest_countries", nested(id_name_partial_field()));

    for relation in ID_NAME_RELATIONS {
        mapping = mapping.field(*relation, id_name_field());
    }
    mapping
}

pub fn to_document(row: &SourceRow) -> Map<String, Value> {
    let mut document = Map::new();
    copy_columns(row, &mut document, PLAIN_COLUMNS);

    for relation in ID_NAME_RELATIONS {
        document.insert(relation.to_string(), id_name_dict(row.related(relation)));
    }

    document.insert(
        "archived_by".to_string(),
        contact_or_adviser_dict(row.related("archived_by"), false),
    );
    document.insert(
        "one_list_group_global_account_manager".to_string(),
        adviser_dict_with_team(row.related("one_list_account_owner")),
    );
    document.insert("sector".to_string(), sector_dict(row.related("sector")));
    document.insert(
        "address".to_string(),
        address_dict(Some(&row.data), "address"),
    );
    document.insert(
        "registered_address".to_string(),
        address_dict(Some(&row.data), "registered_address"),
    );
    document.insert(
        "export_to_countries".to_string(),
        id_name_list_of_dicts(row.related_list("export_to_countries")),
    );
    document.insert(
        "future_interest_countries".to_string(),
        id_name_list_of_dicts(row.related_list("future_interest_countries")),
    );
    document.insert(
        "latest_interaction_date".to_string(),
        latest_related_value(row, "interactions", "date"),
    );

    document
}

pub fn source_query() -> SourceQuery {
    SourceQuery {
        table: "company_company".to_string(),
        primary_key: "id".to_string(),
        recency_column: Some("modified_on".to_string()),
        rows_sql: r#"
SELECT c.id,
       to_jsonb(c)
       || jsonb_build_object(
            'business_type', (SELECT to_jsonb(x) FROM metadata_businesstype x WHERE x.id = c.business_type_id),
            'employee_range', (SELECT to_jsonb(x) FROM metadata_employeerange x WHERE x.id = c.employee_range_id),
            'turnover_range', (SELECT to_jsonb(x) FROM metadata_turnoverrange x WHERE x.id = c.turnover_range_id),
            'export_experience_category', (SELECT to_jsonb(x) FROM company_exportexperiencecategory x WHERE x.id = c.export_experience_category_id),
            'headquarter_type', (SELECT to_jsonb(x) FROM metadata_headquartertype x WHERE x.id = c.headquarter_type_id),
            'uk_region', (SELECT to_jsonb(x) FROM metadata_ukregion x WHERE x.id = c.uk_region_id),
            'one_list_tier', (SELECT to_jsonb(x) FROM company_onelisttier x WHERE x.id = c.one_list_tier_id),
            'global_headquarters', (SELECT to_jsonb(x) FROM company_company x WHERE x.id = c.global_headquarters_id),
            'archived_by', (SELECT to_jsonb(x) FROM company_advisor x WHERE x.id = c.archived_by_id),
            'one_list_account_owner', (
                SELECT to_jsonb(a) || jsonb_build_object('dit_team', to_jsonb(t))
                FROM company_advisor a LEFT JOIN metadata_team t ON t.id = a.dit_team_id
                WHERE a.id = c.one_list_account_owner_id),
            'sector', (
                SELECT to_jsonb(s) || jsonb_build_object('ancestors', COALESCE((
                    SELECT jsonb_agg(jsonb_build_object('id', p.id) ORDER BY p.level)
                    FROM metadata_sector p
                    WHERE p.tree_id = s.tree_id AND p.lft < s.lft AND p.rght > s.rght), '[]'::jsonb))
                FROM metadata_sector s WHERE s.id = c.sector_id),
            'address_area', (SELECT to_jsonb(x) FROM metadata_administrativearea x WHERE x.id = c.address_area_id),
            'address_country', (SELECT to_jsonb(x) FROM metadata_country x WHERE x.id = c.address_country_id),
            'registered_address_area', (SELECT to_jsonb(x) FROM metadata_administrativearea x WHERE x.id = c.registered_address_area_id),
            'registered_address_country', (SELECT to_jsonb(x) FROM metadata_country x WHERE x.id = c.registered_address_country_id),
            'export_to_countries', COALESCE((
                SELECT jsonb_agg(to_jsonb(x) ORDER BY x.name)
                FROM company_companyexportcountry e JOIN metadata_country x ON x.id = e.country_id
                WHERE e.company_id = c.id AND e.status = 'currently_exporting'), '[]'::jsonb),
            'future_interest_countries', COALESCE((
                SELECT jsonb_agg(to_jsonb(x) ORDER BY x.name)
                FROM company_companyexportcountry e JOIN metadata_country x ON x.id = e.country_id
                WHERE e.company_id = c.id AND e.status = 'future_interest'), '[]'::jsonb),
            'interactions', COALESCE((
                SELECT jsonb_agg(jsonb_build_object('date', i.date))
                FROM interaction_interaction i WHERE i.company_id = c.id), '[]'::jsonb)
          ) AS row
FROM company_company c
WHERE c.id = ANY($1)
"#
        .to_string(),
    }
}
