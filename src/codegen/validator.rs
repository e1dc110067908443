//! Validator IR
//!
//! The converter's output: a tree that renders both to a zod expression and
//! to the TypeScript type it infers, and that can describe itself back as a
//! [`SchemaNode`]. `introspect(convert(node)) == node` (examples aside) is
//! the round-trip property the generated validators are held to.
//!
//! Wrapping order is fixed: `describe` innermost, then `optional`, then
//! `nullable` outermost.

use serde_json::Value;

use super::names::schema_const;
use crate::schema::{
    AdditionalProperties, ArraySchema, EnumSchema, Literal, NumberSchema, ObjectSchema,
    Property, SchemaKind, SchemaNode, StringFormat, StringSchema,
};

const INDENT: &str = "  ";

/// How a reference to another declaration is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// The declaration exists already; reference it directly
    Direct,
    /// The declaration comes later in a cycle; defer with `z.lazy`
    Lazy,
}

/// What an object does with keys it does not declare
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectExtra {
    /// zod default: unknown keys are stripped
    Strip,
    /// `.strict()`: unknown keys are rejected
    Strict,
    /// `.passthrough()`: unknown keys are kept as-is
    Passthrough,
    /// `.catchall(V)`: unknown keys must match V
    Catchall(Box<Validator>),
}

/// One declared object property
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectField {
    pub name: String,
    pub validator: Validator,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    Unknown,
    String(StringSchema),
    Number(NumberSchema),
    Boolean,
    Null,
    Enum(Vec<Literal>),
    Array {
        items: Box<Validator>,
        min_items: Option<u64>,
        max_items: Option<u64>,
    },
    Object {
        fields: Vec<ObjectField>,
        extra: ObjectExtra,
    },
    /// An object without declared properties: `z.record(z.string(), V)`.
    /// `None` accepts any value.
    Record(Option<Box<Validator>>),
    Reference {
        /// Component name as written in the document
        target: String,
        /// Emitted type name
        identifier: String,
        binding: Binding,
    },
    /// A caller-owned validator standing in for a structurally equal schema
    PreRegistered {
        identifier: String,
        /// Name of the emitted output type alias
        type_alias: String,
        /// The schema it stands in for (without description)
        schema: Box<SchemaNode>,
    },
    Union(Vec<Validator>),
    DiscriminatedUnion {
        discriminator: String,
        /// Discriminator value → variant index
        mapping: Vec<(Literal, usize)>,
        variants: Vec<Validator>,
    },
    Intersection(Vec<Validator>),
    Described {
        inner: Box<Validator>,
        description: String,
    },
    Optional(Box<Validator>),
    Nullable(Box<Validator>),
}

impl Validator {
    // =========================================================================
    // zod expression
    // =========================================================================

    /// Render as a zod expression at indentation level zero
    pub fn render_expr(&self) -> String {
        self.expr(0)
    }

    fn expr(&self, level: usize) -> String {
        match self {
            Self::Unknown => "z.unknown()".to_string(),
            Self::String(s) => render_string(s),
            Self::Number(n) => {
                let mut out = String::from("z.number()");
                if n.integer {
                    out.push_str(".int()");
                }
                if let Some(min) = n.minimum {
                    out.push_str(&format!(".min({})", render_number(min)));
                }
                if let Some(max) = n.maximum {
                    out.push_str(&format!(".max({})", render_number(max)));
                }
                out
            }
            Self::Boolean => "z.boolean()".to_string(),
            Self::Null => "z.null()".to_string(),
            Self::Enum(values) => render_enum(values),
            Self::Array {
                items,
                min_items,
                max_items,
            } => {
                let mut out = format!("z.array({})", items.expr(level));
                if let Some(min) = min_items {
                    out.push_str(&format!(".min({})", min));
                }
                if let Some(max) = max_items {
                    out.push_str(&format!(".max({})", max));
                }
                out
            }
            Self::Object { fields, extra } => {
                let mut out = String::from("z.object({");
                if fields.is_empty() {
                    out.push_str("})");
                } else {
                    out.push('\n');
                    let inner = INDENT.repeat(level + 1);
                    for field in fields {
                        out.push_str(&format!(
                            "{}{}: {},\n",
                            inner,
                            property_key(&field.name),
                            field_expr(&field.validator, field.required, level + 1)
                        ));
                    }
                    out.push_str(&INDENT.repeat(level));
                    out.push_str("})");
                }
                match extra {
                    ObjectExtra::Strip => {}
                    ObjectExtra::Strict => out.push_str(".strict()"),
                    ObjectExtra::Passthrough => out.push_str(".passthrough()"),
                    ObjectExtra::Catchall(value) => {
                        out.push_str(&format!(".catchall({})", value.expr(level)));
                    }
                }
                out
            }
            Self::Record(None) => "z.record(z.string(), z.unknown())".to_string(),
            Self::Record(Some(value)) => format!("z.record(z.string(), {})", value.expr(level)),
            Self::Reference {
                identifier,
                binding: Binding::Direct,
                ..
            } => schema_const(identifier),
            Self::Reference {
                identifier,
                binding: Binding::Lazy,
                ..
            } => format!("z.lazy(() => {})", schema_const(identifier)),
            Self::PreRegistered { identifier, .. } => identifier.clone(),
            Self::Union(variants) => {
                format!("z.union([{}])", list(variants, level))
            }
            Self::DiscriminatedUnion {
                discriminator,
                variants,
                ..
            } => format!(
                "z.discriminatedUnion({}, [{}])",
                js_string(discriminator),
                list(variants, level)
            ),
            Self::Intersection(parts) => {
                let mut out = String::new();
                for (i, part) in parts.iter().enumerate() {
                    if i == 0 {
                        out.push_str(&part.expr(level));
                    } else {
                        out.push_str(&format!(".and({})", part.expr(level)));
                    }
                }
                out
            }
            Self::Described { inner, description } => {
                format!("{}.describe({})", inner.expr(level), js_string(description))
            }
            Self::Optional(inner) => format!("{}.optional()", inner.expr(level)),
            Self::Nullable(inner) => format!("{}.nullable()", inner.expr(level)),
        }
    }

    // =========================================================================
    // TypeScript type
    // =========================================================================

    /// Render the TypeScript type this validator produces
    pub fn render_type(&self) -> String {
        self.ty(0)
    }

    fn ty(&self, level: usize) -> String {
        match self {
            Self::Unknown => "unknown".to_string(),
            Self::String(_) => "string".to_string(),
            Self::Number(_) => "number".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Null => "null".to_string(),
            Self::Enum(values) => values
                .iter()
                .map(Literal::to_string)
                .collect::<Vec<_>>()
                .join(" | "),
            Self::Array { items, .. } => format!("Array<{}>", items.ty(level)),
            Self::Object { fields, extra } => {
                let mut out = String::from("{");
                if fields.is_empty() {
                    out.push('}');
                } else {
                    out.push('\n');
                    let inner = INDENT.repeat(level + 1);
                    for field in fields {
                        let (value, optional) = field_type(&field.validator, field.required, level + 1);
                        out.push_str(&format!(
                            "{}{}{}: {};\n",
                            inner,
                            property_key(&field.name),
                            if optional { "?" } else { "" },
                            value
                        ));
                    }
                    out.push_str(&INDENT.repeat(level));
                    out.push('}');
                }
                match extra {
                    ObjectExtra::Strip | ObjectExtra::Strict => out,
                    ObjectExtra::Passthrough => format!("{} & {{ [key: string]: unknown }}", out),
                    ObjectExtra::Catchall(value) => {
                        format!("{} & {{ [key: string]: {} }}", out, value.ty(level))
                    }
                }
            }
            Self::Record(None) => "Record<string, unknown>".to_string(),
            Self::Record(Some(value)) => format!("Record<string, {}>", value.ty(level)),
            Self::Reference { identifier, .. } => identifier.clone(),
            Self::PreRegistered { type_alias, .. } => type_alias.clone(),
            Self::Union(variants) | Self::DiscriminatedUnion { variants, .. } => variants
                .iter()
                .map(|v| v.ty(level))
                .collect::<Vec<_>>()
                .join(" | "),
            Self::Intersection(parts) => parts
                .iter()
                .map(|p| {
                    let rendered = p.ty(level);
                    if p.is_type_union() {
                        format!("({})", rendered)
                    } else {
                        rendered
                    }
                })
                .collect::<Vec<_>>()
                .join(" & "),
            Self::Described { inner, .. } => inner.ty(level),
            Self::Optional(inner) => format!("{} | undefined", inner.ty(level)),
            Self::Nullable(inner) => format!("{} | null", inner.ty(level)),
        }
    }

    /// True when the rendered type is a top-level `|` chain
    fn is_type_union(&self) -> bool {
        match self {
            Self::Enum(values) => values.len() > 1,
            Self::Union(_) | Self::DiscriminatedUnion { .. } | Self::Optional(_) | Self::Nullable(_) => true,
            Self::Described { inner, .. } => inner.is_type_union(),
            _ => false,
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Describe this validator as the schema node it was built from
    pub fn introspect(&self) -> SchemaNode {
        match self {
            Self::Unknown => SchemaNode::new(SchemaKind::Unknown),
            Self::String(s) => SchemaNode::new(SchemaKind::String(s.clone())),
            Self::Number(n) => SchemaNode::new(SchemaKind::Number(n.clone())),
            Self::Boolean => SchemaNode::new(SchemaKind::Boolean),
            Self::Null => SchemaNode::new(SchemaKind::Null),
            Self::Enum(values) => SchemaNode::new(SchemaKind::Enum(EnumSchema::new(values.clone()))),
            Self::Array {
                items,
                min_items,
                max_items,
            } => SchemaNode::new(SchemaKind::Array(ArraySchema {
                items: Box::new(items.introspect()),
                min_items: *min_items,
                max_items: *max_items,
            })),
            Self::Object { fields, extra } => {
                let properties = fields
                    .iter()
                    .map(|field| {
                        (
                            field.name.clone(),
                            Property {
                                schema: field.validator.introspect(),
                                required: field.required,
                            },
                        )
                    })
                    .collect();
                let (additional, sealed) = match extra {
                    ObjectExtra::Strip => (AdditionalProperties::None, false),
                    ObjectExtra::Strict => (AdditionalProperties::None, true),
                    ObjectExtra::Passthrough => (AdditionalProperties::Any, false),
                    ObjectExtra::Catchall(value) => {
                        (AdditionalProperties::Schema(Box::new(value.introspect())), false)
                    }
                };
                SchemaNode::new(SchemaKind::Object(ObjectSchema {
                    properties,
                    additional,
                    sealed,
                }))
            }
            Self::Record(value) => SchemaNode::new(SchemaKind::Object(ObjectSchema {
                properties: Default::default(),
                additional: match value {
                    None => AdditionalProperties::Any,
                    Some(value) => AdditionalProperties::Schema(Box::new(value.introspect())),
                },
                sealed: false,
            })),
            Self::Reference { target, .. } => SchemaNode::reference(target.clone()),
            Self::PreRegistered { schema, .. } => (**schema).clone(),
            Self::Union(variants) | Self::DiscriminatedUnion { variants, .. } => {
                SchemaNode::new(SchemaKind::Union(variants.iter().map(Validator::introspect).collect()))
            }
            Self::Intersection(parts) => {
                SchemaNode::new(SchemaKind::Intersection(parts.iter().map(Validator::introspect).collect()))
            }
            Self::Described { inner, description } => {
                let mut node = inner.introspect();
                node.description = Some(description.clone());
                node
            }
            Self::Optional(inner) => {
                let mut node = inner.introspect();
                node.optional = true;
                node
            }
            Self::Nullable(inner) => {
                let mut node = inner.introspect();
                node.nullable = true;
                node
            }
        }
    }

    /// Identifiers of caller validators this tree uses, in first-use order
    pub fn pre_registered_identifiers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_pre_registered(&mut out);
        out
    }

    fn collect_pre_registered<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::PreRegistered { identifier, .. } => {
                if !out.contains(&identifier.as_str()) {
                    out.push(identifier);
                }
            }
            Self::Array { items, .. } => items.collect_pre_registered(out),
            Self::Object { fields, extra } => {
                for field in fields {
                    field.validator.collect_pre_registered(out);
                }
                if let ObjectExtra::Catchall(value) = extra {
                    value.collect_pre_registered(out);
                }
            }
            Self::Record(Some(value)) => value.collect_pre_registered(out),
            Self::Union(members)
            | Self::Intersection(members)
            | Self::DiscriminatedUnion { variants: members, .. } => {
                for member in members {
                    member.collect_pre_registered(out);
                }
            }
            Self::Described { inner, .. } | Self::Optional(inner) | Self::Nullable(inner) => {
                inner.collect_pre_registered(out)
            }
            _ => {}
        }
    }

    /// Number of lazily bound references in the tree
    pub fn lazy_count(&self) -> usize {
        match self {
            Self::Reference {
                binding: Binding::Lazy,
                ..
            } => 1,
            Self::Array { items, .. } => items.lazy_count(),
            Self::Object { fields, extra } => {
                let extra = match extra {
                    ObjectExtra::Catchall(value) => value.lazy_count(),
                    _ => 0,
                };
                fields.iter().map(|f| f.validator.lazy_count()).sum::<usize>() + extra
            }
            Self::Record(Some(value)) => value.lazy_count(),
            Self::Union(members)
            | Self::Intersection(members)
            | Self::DiscriminatedUnion { variants: members, .. } => {
                members.iter().map(Validator::lazy_count).sum()
            }
            Self::Described { inner, .. } | Self::Optional(inner) | Self::Nullable(inner) => {
                inner.lazy_count()
            }
            _ => 0,
        }
    }
}

/// A not-required field gains `.optional()` inside any `.nullable()`
fn field_expr(validator: &Validator, required: bool, level: usize) -> String {
    if required {
        return validator.expr(level);
    }
    match validator {
        Validator::Nullable(inner) => format!("{}.nullable()", field_expr(inner, false, level)),
        Validator::Optional(_) => validator.expr(level),
        other => format!("{}.optional()", other.expr(level)),
    }
}

/// Field type and whether the key is optional (`?`)
fn field_type(validator: &Validator, required: bool, level: usize) -> (String, bool) {
    if required {
        return (validator.ty(level), false);
    }
    match validator {
        Validator::Optional(inner) => (inner.ty(level), true),
        Validator::Nullable(inner) => {
            let (ty, _) = field_type(inner, false, level);
            (format!("{} | null", ty), true)
        }
        other => (other.ty(level), true),
    }
}

fn list(items: &[Validator], level: usize) -> String {
    items
        .iter()
        .map(|v| v.expr(level))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_string(s: &StringSchema) -> String {
    let mut out = String::from("z.string()");
    match s.format {
        Some(StringFormat::Email) => out.push_str(".email()"),
        Some(StringFormat::Url) | Some(StringFormat::Uri) => out.push_str(".url()"),
        Some(StringFormat::Uuid) => out.push_str(".uuid()"),
        Some(StringFormat::DateTime) => out.push_str(".datetime()"),
        Some(StringFormat::Date) => out.push_str(".date()"),
        None => {
            if let Some(pattern) = &s.pattern {
                out.push_str(&format!(".regex(new RegExp({}))", js_string(pattern)));
            }
        }
    }
    if let Some(min) = s.min_length {
        out.push_str(&format!(".min({})", min));
    }
    if let Some(max) = s.max_length {
        out.push_str(&format!(".max({})", max));
    }
    out
}

fn render_enum(values: &[Literal]) -> String {
    if values.iter().all(|v| matches!(v, Literal::String(_))) {
        let members: Vec<String> = values.iter().map(Literal::to_string).collect();
        return format!("z.enum([{}])", members.join(", "));
    }
    match values {
        [single] => format!("z.literal({})", single),
        _ => {
            let members: Vec<String> = values.iter().map(|v| format!("z.literal({})", v)).collect();
            format!("z.union([{}])", members.join(", "))
        }
    }
}

fn render_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// A double-quoted string literal
pub fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// A property key, quoted unless it is a plain identifier
pub fn property_key(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if plain {
        name.to_string()
    } else {
        js_string(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Number;

    fn string() -> Validator {
        Validator::String(StringSchema::default())
    }

    #[test]
    fn test_wrapping_order() {
        let v = Validator::Nullable(Box::new(Validator::Optional(Box::new(Validator::Described {
            inner: Box::new(string()),
            description: "a name".into(),
        }))));
        assert_eq!(v.render_expr(), r#"z.string().describe("a name").optional().nullable()"#);
        assert_eq!(v.render_type(), "string | undefined | null");

        let node = v.introspect();
        assert!(node.optional && node.nullable);
        assert_eq!(node.description.as_deref(), Some("a name"));
    }

    #[test]
    fn test_not_required_field_optional_inside_nullable() {
        let v = Validator::Object {
            fields: vec![ObjectField {
                name: "nickname".into(),
                validator: Validator::Nullable(Box::new(string())),
                required: false,
            }],
            extra: ObjectExtra::Strict,
        };
        assert_eq!(
            v.render_expr(),
            "z.object({\n  nickname: z.string().optional().nullable(),\n}).strict()"
        );
        assert_eq!(v.render_type(), "{\n  nickname?: string | null;\n}");
    }

    #[test]
    fn test_string_formats() {
        let v = Validator::String(StringSchema {
            format: Some(StringFormat::Uri),
            pattern: None,
            min_length: Some(1),
            max_length: Some(2048),
        });
        assert_eq!(v.render_expr(), "z.string().url().min(1).max(2048)");

        let v = Validator::String(StringSchema {
            pattern: Some("^[a-z/]+$".into()),
            ..Default::default()
        });
        assert_eq!(v.render_expr(), r#"z.string().regex(new RegExp("^[a-z/]+$"))"#);
    }

    #[test]
    fn test_number_bounds() {
        let v = Validator::Number(NumberSchema {
            integer: true,
            minimum: Some(0.0),
            maximum: Some(100.5),
        });
        assert_eq!(v.render_expr(), "z.number().int().min(0).max(100.5)");
    }

    #[test]
    fn test_enum_rendering() {
        let strings = Validator::Enum(vec![Literal::String("a".into()), Literal::String("b".into())]);
        assert_eq!(strings.render_expr(), r#"z.enum(["a", "b"])"#);
        assert_eq!(strings.render_type(), r#""a" | "b""#);

        let single = Validator::Enum(vec![Literal::Number(Number::from(1))]);
        assert_eq!(single.render_expr(), "z.literal(1)");

        let mixed = Validator::Enum(vec![Literal::Number(Number::from(1)), Literal::Boolean(true)]);
        assert_eq!(mixed.render_expr(), "z.union([z.literal(1), z.literal(true)])");
    }

    #[test]
    fn test_references() {
        let direct = Validator::Reference {
            target: "User Profile".into(),
            identifier: "UserProfile".into(),
            binding: Binding::Direct,
        };
        assert_eq!(direct.render_expr(), "UserProfileSchema");
        assert_eq!(direct.render_type(), "UserProfile");
        assert_eq!(direct.introspect().ref_target(), Some("User Profile"));

        let lazy = Validator::Reference {
            target: "Node".into(),
            identifier: "Node".into(),
            binding: Binding::Lazy,
        };
        assert_eq!(lazy.render_expr(), "z.lazy(() => NodeSchema)");
        assert_eq!(lazy.lazy_count(), 1);
    }

    #[test]
    fn test_records_and_catchall() {
        assert_eq!(
            Validator::Record(None).render_expr(),
            "z.record(z.string(), z.unknown())"
        );
        let catchall = Validator::Object {
            fields: vec![ObjectField {
                name: "id".into(),
                validator: string(),
                required: true,
            }],
            extra: ObjectExtra::Catchall(Box::new(Validator::Boolean)),
        };
        assert_eq!(
            catchall.render_expr(),
            "z.object({\n  id: z.string(),\n}).catchall(z.boolean())"
        );
        assert_eq!(
            catchall.render_type(),
            "{\n  id: string;\n} & { [key: string]: boolean }"
        );
    }

    #[test]
    fn test_intersection_parenthesizes_unions() {
        let v = Validator::Intersection(vec![
            Validator::Union(vec![string(), Validator::Boolean]),
            Validator::Record(None),
        ]);
        assert_eq!(
            v.render_expr(),
            "z.union([z.string(), z.boolean()]).and(z.record(z.string(), z.unknown()))"
        );
        assert_eq!(v.render_type(), "(string | boolean) & Record<string, unknown>");
    }

    #[test]
    fn test_quoted_property_keys() {
        assert_eq!(property_key("id"), "id");
        assert_eq!(property_key("x-request-id"), "\"x-request-id\"");
        assert_eq!(property_key("2fa"), "\"2fa\"");
    }
}
