//! Mapping layouts matching the objects built by [`super::dict_utils`].

use search_sync_shared::FieldMapping;

pub fn id_name_field() -> FieldMapping {
    FieldMapping::object([
        ("id", FieldMapping::keyword()),
        ("name", FieldMapping::normalized_keyword()),
    ])
}

/// Like [`id_name_field`], with the name searchable by trigrams.
pub fn id_name_partial_field() -> FieldMapping {
    FieldMapping::object([
        ("id", FieldMapping::keyword()),
        ("name", FieldMapping::name_text()),
    ])
}

pub fn address_field() -> FieldMapping {
    let area_or_country = || {
        FieldMapping::object([
            ("id", FieldMapping::keyword()),
            ("name", FieldMapping::trigram_text()),
        ])
    };
    FieldMapping::object([
        ("line_1", FieldMapping::trigram_text()),
        ("line_2", FieldMapping::trigram_text()),
        ("town", FieldMapping::trigram_text()),
        ("county", FieldMapping::trigram_text()),
        ("postcode", FieldMapping::trigram_text()),
        ("area", area_or_country()),
        ("country", area_or_country()),
    ])
}

pub fn company_field() -> FieldMapping {
    FieldMapping::object([
        ("id", FieldMapping::keyword()),
        ("name", FieldMapping::name_text()),
        ("trading_names", FieldMapping::trigram_text()),
    ])
}

pub fn contact_or_adviser_field(include_dit_team: bool) -> FieldMapping {
    let mut properties = vec![
        ("id", FieldMapping::keyword()),
        ("first_name", FieldMapping::normalized_keyword()),
        ("last_name", FieldMapping::normalized_keyword()),
        ("name", FieldMapping::name_text()),
    ];
    if include_dit_team {
        properties.push(("dit_team", id_name_partial_field()));
    }
    FieldMapping::object(properties)
}

pub fn sector_field() -> FieldMapping {
    FieldMapping::object([
        ("id", FieldMapping::keyword()),
        ("name", FieldMapping::normalized_keyword()),
        (
            "ancestors",
            FieldMapping::object([("id", FieldMapping::keyword())]),
        ),
    ])
}

pub fn investment_project_field() -> FieldMapping {
    FieldMapping::object([
        ("id", FieldMapping::keyword()),
        ("name", FieldMapping::name_text()),
        ("project_code", FieldMapping::normalized_keyword()),
    ])
}

/// The same layout as a `nested` field, so that filters on several
/// properties must match within one list element.
pub fn nested(field: FieldMapping) -> FieldMapping {
    match field {
        FieldMapping::Object { properties } => FieldMapping::Nested { properties },
        other => other,
    }
}
