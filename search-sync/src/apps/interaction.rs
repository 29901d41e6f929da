//! Interactions.

use search_sync_repository::postgres::SourceQuery;
use search_sync_shared::{FieldMapping, IndexMapping, SourceRow};
use serde_json::{json, Map, Value};

use super::EntityDescriptor;
use crate::mapper::copy_columns;
use crate::mapper::dict_utils::{
    company_dict, computed_nested_sector_dict, contact_or_adviser_dict,
    contact_or_adviser_list_of_dicts, id_name_dict, id_name_list_of_dicts,
    investment_project_dict,
};
use crate::mapper::fields::{
    company_field, contact_or_adviser_field, id_name_field, id_name_partial_field,
    investment_project_field, nested, sector_field,
};

pub const DESCRIPTOR: EntityDescriptor = EntityDescriptor {
    name: "interaction",
    mapping,
    mapper: to_document,
    source_query,
    search_fields: &[
        "id",
        "subject",
        "company.name",
        "company.name.trigram",
        "contacts.name",
        "contacts.name.trigram",
        "event.name",
        "event.name.trigram",
        "dit_participants.adviser.name",
        "dit_participants.adviser.name.trigram",
        "dit_participants.team.name",
        "dit_participants.team.name.trigram",
    ],
    composite_filters: &[(
        "company_name",
        &[
            "company.name",
            "company.name.trigram",
            "company.trading_names",
            "company.trading_names.trigram",
        ],
    )],
    view_permissions: &[
        "interaction.view_all_interaction",
        "interaction.view_associated_investmentproject_interaction",
    ],
    export_permission: Some("interaction.export_interaction"),
};

const PLAIN_COLUMNS: &[&str] = &[
    "kind",
    "date",
    "subject",
    "notes",
    "status",
    "theme",
    "was_policy_feedback_provided",
    "created_on",
    "modified_on",
];

const ID_NAME_RELATIONS: &[&str] = &["communication_channel", "service", "event"];

pub fn mapping() -> IndexMapping {
    let participant = nested(FieldMapping::object([
        ("adviser", contact_or_adviser_field(false)),
        ("team", id_name_partial_field()),
    ]));

    IndexMapping::new()
        .field("id", FieldMapping::keyword())
        .field("kind", FieldMapping::keyword())
        .field("date", FieldMapping::date())
        .field("subject", FieldMapping::sortable_text())
        .field("notes", FieldMapping::english_text())
        .field("status", FieldMapping::keyword())
        .field("theme", FieldMapping::keyword())
        .field("was_policy_feedback_provided", FieldMapping::boolean())
        .field("created_on", FieldMapping::date())
        .field("modified_on", FieldMapping::date())
        .field("communication_channel", id_name_field())
        .field("service", id_name_field())
        .field("event", id_name_partial_field())
        .field("company", company_field())
        .field("company_sector", sector_field())
        .field("companies", nested(company_field()))
        .field("contacts", nested(contact_or_adviser_field(false)))
        .field("dit_participants", participant)
        .field("investment_project", investment_project_field())
        .field("policy_areas", nested(id_name_field()))
        .field("created_by", contact_or_adviser_field(false))
}

pub fn to_document(row: &SourceRow) -> Map<String, Value> {
    let mut document = Map::new();
    copy_columns(row, &mut document, PLAIN_COLUMNS);

    for relation in ID_NAME_RELATIONS {
        document.insert(relation.to_string(), id_name_dict(row.related(relation)));
    }

    document.insert("company".to_string(), company_dict(row.related("company")));
    document.insert(
        "company_sector".to_string(),
        computed_nested_sector_dict(&row.data, "company.sector"),
    );
    document.insert(
        "companies".to_string(),
        Value::Array(
            row.related_list("companies")
                .into_iter()
                .map(|company| company_dict(Some(company)))
                .collect(),
        ),
    );
    document.insert(
        "contacts".to_string(),
        contact_or_adviser_list_of_dicts(row.related_list("contacts")),
    );
    document.insert(
        "dit_participants".to_string(),
        Value::Array(
            row.related_list("dit_participants")
                .into_iter()
                .map(|participant| {
                    json!({
                        "adviser": contact_or_adviser_dict(
                            participant.get("adviser").and_then(Value::as_object),
                            false,
                        ),
                        "team": id_name_dict(participant.get("team").and_then(Value::as_object)),
                    })
                })
                .collect(),
        ),
    );
    document.insert(
        "investment_project".to_string(),
        investment_project_dict(row.related("investment_project")),
    );
    document.insert(
        "policy_areas".to_string(),
        id_name_list_of_dicts(row.related_list("policy_areas")),
    );
    document.insert(
        "created_by".to_string(),
        contact_or_adviser_dict(row.related("created_by"), false),
    );

    document
}

pub fn source_query() -> SourceQuery {
    SourceQuery {
        table: "interaction_interaction".to_string(),
        primary_key: "id".to_string(),
        recency_column: Some("modified_on".to_string()),
        rows_sql: r#"
SELECT i.id,
       to_jsonb(i)
       || jsonb_build_object(
            'communication_channel', (SELECT to_jsonb(x) FROM interaction_communicationchannel x WHERE x.id = i.communication_channel_id),
            'service', (SELECT to_jsonb(x) FROM metadata_service x WHERE x.id = i.service_id),
            'event', (SELECT to_jsonb(x) FROM event_event x WHERE x.id = i.event_id),
            'investment_project', (SELECT to_jsonb(x) FROM investment_investmentproject x WHERE x.id = i.investment_project_id),
            'created_by', (SELECT to_jsonb(x) FROM company_advisor x WHERE x.id = i.created_by_id),
            'company', (
                SELECT to_jsonb(c) || jsonb_build_object('sector', (
                    SELECT to_jsonb(s) || jsonb_build_object('ancestors', COALESCE((
                        SELECT jsonb_agg(jsonb_build_object('id', p.id) ORDER BY p.level)
                        FROM metadata_sector p
                        WHERE p.tree_id = s.tree_id AND p.lft < s.lft AND p.rght > s.rght), '[]'::jsonb))
                    FROM metadata_sector s WHERE s.id = c.sector_id))
                FROM company_company c WHERE c.id = i.company_id),
            'companies', COALESCE((
                SELECT jsonb_agg(to_jsonb(c) ORDER BY c.name)
                FROM interaction_interaction_companies ic JOIN company_company c ON c.id = ic.company_id
                WHERE ic.interaction_id = i.id), '[]'::jsonb),
            'contacts', COALESCE((
                SELECT jsonb_agg(to_jsonb(c) ORDER BY c.last_name, c.first_name)
                FROM interaction_interaction_contacts ic JOIN company_contact c ON c.id = ic.contact_id
                WHERE ic.interaction_id = i.id), '[]'::jsonb),
            'dit_participants', COALESCE((
                SELECT jsonb_agg(jsonb_build_object('adviser', to_jsonb(a), 'team', to_jsonb(t)) ORDER BY p.id)
                FROM interaction_interactionditparticipant p
                LEFT JOIN company_advisor a ON a.id = p.adviser_id
                LEFT JOIN metadata_team t ON t.id = p.team_id
                WHERE p.interaction_id = i.id), '[]'::jsonb),
            'policy_areas', COALESCE((
                SELECT jsonb_agg(to_jsonb(x) ORDER BY x.name)
                FROM interaction_interaction_policy_areas ip JOIN interaction_policyarea x ON x.id = ip.policyarea_id
                WHERE ip.interaction_id = i.id), '[]'::jsonb)
          ) AS row
FROM interaction_interaction i
WHERE i.id = ANY($1)
"#
        .to_string(),
    }
}
