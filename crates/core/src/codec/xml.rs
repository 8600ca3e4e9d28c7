//! XML form of action and result trees
//!
//! Scalars are written as attributes in field order; parameters, conditionals,
//! queries and child collections are nested elements. Child collections are
//! always written, empty or not, so a decoded tree has exactly the shape of
//! the encoded one.
//!
//! ```text
//! <PersistenceActions xmlns="urn:actionflow:persistence:v1">
//!   <Action ActionId="1" Type="Update" EntityFullName="Sales.Order"
//!           ProviderName="Sql" RowVersion="42" CommandTimeout="30">
//!     <Parameters>
//!       <Parameter Name="id" Direction="Input" ValueType="int" Value="10"/>
//!     </Parameters>
//!     <Conditional>
//!       <Condition Property="id" Operator="Equal" ValueType="int" Value="10"/>
//!     </Conditional>
//!     <BeforeActions/>
//!     <AfterActions/>
//!     <AlternativeActions/>
//!   </Action>
//! </PersistenceActions>
//! ```
//!
//! Bytes values are base64-encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::{MAX_DECODE_DEPTH, XML_NAMESPACE};
use crate::action::{
    ActionId, ActionNode, ActionType, ComparisonOperator, Conditional, LogicalOperator, Parameter,
    ParameterDirection, QueryInfo,
};
use crate::error::{Error, Result};
use crate::result::ResultNode;
use crate::value::{Value, ValueKind};

/// Root element of an encoded action array
pub const ACTIONS_ROOT: &str = "PersistenceActions";
/// Root element of an encoded result array
pub const RESULTS_ROOT: &str = "PersistenceResults";

// =============================================================================
// Public API
// =============================================================================

/// Encode a flat array of action trees as an XML document
pub fn actions_to_xml(actions: &[ActionNode]) -> Result<String> {
    let mut root = Element::new(ACTIONS_ROOT).attr("xmlns", XML_NAMESPACE);
    root.children = actions.iter().map(action_element).collect();
    write_document(&root)
}

/// Decode an XML document produced by [`actions_to_xml`]
pub fn actions_from_xml(xml: &str) -> Result<Vec<ActionNode>> {
    let root = parse_document(xml)?;
    check_root(&root, ACTIONS_ROOT)?;
    root.children
        .iter()
        .map(|el| parse_action(el, 0))
        .collect()
}

/// Encode a flat array of result trees as an XML document
pub fn results_to_xml(results: &[ResultNode]) -> Result<String> {
    let mut root = Element::new(RESULTS_ROOT).attr("xmlns", XML_NAMESPACE);
    root.children = results.iter().map(result_element).collect();
    write_document(&root)
}

/// Decode an XML document produced by [`results_to_xml`]
pub fn results_from_xml(xml: &str) -> Result<Vec<ResultNode>> {
    let root = parse_document(xml)?;
    check_root(&root, RESULTS_ROOT)?;
    root.children
        .iter()
        .map(|el| parse_result(el, 0))
        .collect()
}

fn check_root(root: &Element, expected: &str) -> Result<()> {
    if root.name != expected {
        return Err(Error::SerializationError(format!(
            "expected root element <{}>, found <{}>",
            expected, root.name
        )));
    }
    match root.get("xmlns") {
        Some(ns) if ns == XML_NAMESPACE => Ok(()),
        Some(ns) => Err(Error::SerializationError(format!(
            "unsupported namespace '{}'",
            ns
        ))),
        None => Err(Error::SerializationError(format!(
            "root element <{}> is missing its namespace",
            expected
        ))),
    }
}

// =============================================================================
// Element tree
// =============================================================================

/// Minimal in-memory element: name, ordered attributes, child elements
#[derive(Debug, Clone, PartialEq)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
}

impl Element {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attrs.push((key.to_string(), value.into()));
        self
    }

    fn attr_opt(self, key: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.attr(key, v),
            None => self,
        }
    }

    fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            Error::SerializationError(format!(
                "element <{}> is missing attribute '{}'",
                self.name, key
            ))
        })
    }

    fn find_child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }
}

fn write_document(root: &Element) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    write_element(&mut writer, root)?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| Error::SerializationError(format!("writer produced invalid UTF-8: {}", e)))
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &Element) -> Result<()> {
    let mut start = BytesStart::new(el.name.as_str());
    for (k, v) in &el.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if el.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
    } else {
        writer.write_event(Event::Start(start))?;
        for child in &el.children {
            write_element(writer, child)?;
        }
        writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
    }
    Ok(())
}

fn parse_document(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if stack.len() > MAX_DECODE_DEPTH * 4 {
                    return Err(Error::SerializationError(
                        "document nesting is too deep".to_string(),
                    ));
                }
                stack.push(element_from_start(&e)?);
            }
            Event::Empty(e) => {
                let el = element_from_start(&e)?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::End(_) => {
                let el = stack.pop().ok_or_else(|| {
                    Error::SerializationError("unbalanced closing tag".to_string())
                })?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Text(t) => {
                if !t.unescape()?.trim().is_empty() {
                    return Err(Error::SerializationError(
                        "unexpected text content".to_string(),
                    ));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(Error::SerializationError(
            "document ended inside an open element".to_string(),
        ));
    }
    root.ok_or_else(|| Error::SerializationError("document has no root element".to_string()))
}

fn element_from_start(e: &BytesStart<'_>) -> Result<Element> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|err| Error::SerializationError(format!("invalid element name: {}", err)))?
        .to_string();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| Error::SerializationError(format!("invalid attribute name: {}", err)))?
            .to_string();
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None => {
            if root.is_some() {
                return Err(Error::SerializationError(
                    "document has more than one root element".to_string(),
                ));
            }
            *root = Some(el);
        }
    }
    Ok(())
}

// =============================================================================
// Actions
// =============================================================================

fn action_element(action: &ActionNode) -> Element {
    let mut el = Element::new("Action")
        .attr("ActionId", action.action_id.to_string())
        .attr("Type", action.action_type.as_str())
        .attr("EntityFullName", action.entity_full_name.as_str())
        .attr("ProviderName", action.provider_name.as_str())
        .attr_opt("StoredProcedureName", action.stored_procedure_name.as_deref())
        .attr_opt("RowVersion", action.row_version.map(|v| v.to_string()))
        .attr("CommandTimeout", action.command_timeout.to_string())
        .child(parameters_element(&action.parameters));

    if let Some(cond) = &action.conditional {
        el = el.child(Element::new("Conditional").child(conditional_element(cond)));
    }
    if let Some(query) = &action.query {
        el = el.child(query_element(query));
    }

    el.child(collection("BeforeActions", &action.before_actions, action_element))
        .child(collection("AfterActions", &action.after_actions, action_element))
        .child(collection(
            "AlternativeActions",
            &action.alternative_actions,
            action_element,
        ))
}

fn parse_action(el: &Element, depth: usize) -> Result<ActionNode> {
    expect_name(el, "Action")?;
    check_depth(depth)?;

    let type_name = el.require("Type")?;
    let action_type = ActionType::parse(type_name).ok_or_else(|| {
        Error::SerializationError(format!("unknown action type '{}'", type_name))
    })?;

    let conditional = match el.find_child("Conditional") {
        Some(wrapper) => Some(parse_single_conditional(wrapper, depth + 1)?),
        None => None,
    };
    let query = match el.find_child("Query") {
        Some(q) => Some(parse_query(q, depth + 1)?),
        None => None,
    };

    Ok(ActionNode {
        action_id: ActionId(parse_num(el, "ActionId")?),
        action_type,
        entity_full_name: el.require("EntityFullName")?.to_string(),
        provider_name: el.require("ProviderName")?.to_string(),
        parameters: parse_parameters(el)?,
        conditional,
        query,
        stored_procedure_name: el.get("StoredProcedureName").map(str::to_string),
        row_version: parse_num_opt(el, "RowVersion")?,
        command_timeout: parse_num(el, "CommandTimeout")?,
        before_actions: parse_collection(el, "BeforeActions", |c| parse_action(c, depth + 1))?,
        after_actions: parse_collection(el, "AfterActions", |c| parse_action(c, depth + 1))?,
        alternative_actions: parse_collection(el, "AlternativeActions", |c| {
            parse_action(c, depth + 1)
        })?,
    })
}

// =============================================================================
// Results
// =============================================================================

fn result_element(result: &ResultNode) -> Element {
    let mut el = Element::new("Result")
        .attr("ActionId", result.action_id.to_string())
        .attr("Success", result.success.to_string())
        .attr_opt("FailureMessage", result.failure_message.as_deref())
        .attr("AffectedRows", result.affected_rows.to_string())
        .attr("RowVersion", result.row_version.to_string())
        .child(parameters_element(&result.parameters));

    if let Some(value) = &result.result {
        el = el.child(value_attrs(Element::new("Output"), value));
    }

    el.child(collection("BeforeActions", &result.before_actions, result_element))
        .child(collection("AfterActions", &result.after_actions, result_element))
        .child(collection(
            "AlternativeActions",
            &result.alternative_actions,
            result_element,
        ))
}

fn parse_result(el: &Element, depth: usize) -> Result<ResultNode> {
    expect_name(el, "Result")?;
    check_depth(depth)?;

    let result = match el.find_child("Output") {
        Some(output) => Some(parse_value(output)?),
        None => None,
    };

    Ok(ResultNode {
        action_id: ActionId(parse_num(el, "ActionId")?),
        success: parse_bool(el.require("Success")?)?,
        failure_message: el.get("FailureMessage").map(str::to_string),
        affected_rows: parse_num(el, "AffectedRows")?,
        row_version: parse_num(el, "RowVersion")?,
        parameters: parse_parameters(el)?,
        result,
        before_actions: parse_collection(el, "BeforeActions", |c| parse_result(c, depth + 1))?,
        after_actions: parse_collection(el, "AfterActions", |c| parse_result(c, depth + 1))?,
        alternative_actions: parse_collection(el, "AlternativeActions", |c| {
            parse_result(c, depth + 1)
        })?,
    })
}

// =============================================================================
// Shared pieces
// =============================================================================

fn collection<T>(name: &str, items: &[T], to_element: fn(&T) -> Element) -> Element {
    let mut el = Element::new(name);
    el.children = items.iter().map(to_element).collect();
    el
}

fn parse_collection<T>(
    el: &Element,
    name: &str,
    parse_one: impl Fn(&Element) -> Result<T>,
) -> Result<Vec<T>> {
    match el.find_child(name) {
        Some(wrapper) => wrapper.children.iter().map(parse_one).collect(),
        None => Ok(Vec::new()),
    }
}

fn parameters_element(parameters: &[Parameter]) -> Element {
    let mut el = Element::new("Parameters");
    el.children = parameters
        .iter()
        .map(|p| {
            value_attrs(
                Element::new("Parameter")
                    .attr("Name", p.name.as_str())
                    .attr("Direction", p.direction.as_str()),
                &p.value,
            )
        })
        .collect();
    el
}

fn parse_parameters(el: &Element) -> Result<Vec<Parameter>> {
    parse_collection(el, "Parameters", |p| {
        expect_name(p, "Parameter")?;
        let direction_name = p.require("Direction")?;
        let direction = ParameterDirection::parse(direction_name).ok_or_else(|| {
            Error::SerializationError(format!("unknown parameter direction '{}'", direction_name))
        })?;
        Ok(Parameter {
            name: p.require("Name")?.to_string(),
            value: parse_value(p)?,
            direction,
        })
    })
}

fn conditional_element(cond: &Conditional) -> Element {
    match cond {
        Conditional::Condition {
            property,
            operator,
            value,
        } => value_attrs(
            Element::new("Condition")
                .attr("Property", property.as_str())
                .attr("Operator", operator.as_str()),
            value,
        ),
        Conditional::Group { operator, terms } => {
            let mut el = Element::new("Group").attr("Operator", operator.as_str());
            el.children = terms.iter().map(conditional_element).collect();
            el
        }
        Conditional::Not(inner) => Element::new("Not").child(conditional_element(inner)),
    }
}

/// Parse the single conditional term held by a wrapper element
fn parse_single_conditional(wrapper: &Element, depth: usize) -> Result<Conditional> {
    match wrapper.children.as_slice() {
        [only] => parse_conditional(only, depth),
        _ => Err(Error::SerializationError(format!(
            "<{}> must contain exactly one term",
            wrapper.name
        ))),
    }
}

fn parse_conditional(el: &Element, depth: usize) -> Result<Conditional> {
    check_depth(depth)?;
    match el.name.as_str() {
        "Condition" => {
            let op_name = el.require("Operator")?;
            let operator = ComparisonOperator::parse(op_name).ok_or_else(|| {
                Error::SerializationError(format!("unknown comparison operator '{}'", op_name))
            })?;
            Ok(Conditional::Condition {
                property: el.require("Property")?.to_string(),
                operator,
                value: parse_value(el)?,
            })
        }
        "Group" => {
            let op_name = el.require("Operator")?;
            let operator = LogicalOperator::parse(op_name).ok_or_else(|| {
                Error::SerializationError(format!("unknown logical operator '{}'", op_name))
            })?;
            let terms = el
                .children
                .iter()
                .map(|c| parse_conditional(c, depth + 1))
                .collect::<Result<Vec<_>>>()?;
            Ok(Conditional::Group { operator, terms })
        }
        "Not" => Ok(Conditional::Not(Box::new(parse_single_conditional(
            el,
            depth + 1,
        )?))),
        other => Err(Error::SerializationError(format!(
            "unexpected conditional element <{}>",
            other
        ))),
    }
}

fn query_element(query: &QueryInfo) -> Element {
    let mut el = Element::new("Query")
        .attr("EntityFullName", query.entity_full_name.as_str())
        .attr_opt("Take", query.take.map(|t| t.to_string()));
    if let Some(filter) = &query.filter {
        el = el.child(Element::new("Filter").child(conditional_element(filter)));
    }
    el
}

fn parse_query(el: &Element, depth: usize) -> Result<QueryInfo> {
    let filter = match el.find_child("Filter") {
        Some(wrapper) => Some(parse_single_conditional(wrapper, depth + 1)?),
        None => None,
    };
    Ok(QueryInfo {
        entity_full_name: el.require("EntityFullName")?.to_string(),
        filter,
        take: parse_num_opt(el, "Take")?,
    })
}

fn value_attrs(el: Element, value: &Value) -> Element {
    let el = el.attr("ValueType", value.kind().as_str());
    match value {
        Value::Null => el,
        Value::Bool(b) => el.attr("Value", b.to_string()),
        Value::Int(i) => el.attr("Value", i.to_string()),
        Value::Float(f) => el.attr("Value", f.to_string()),
        Value::String(s) => el.attr("Value", s.as_str()),
        Value::Bytes(b) => el.attr("Value", STANDARD.encode(b)),
    }
}

fn parse_value(el: &Element) -> Result<Value> {
    let kind_name = el.require("ValueType")?;
    let kind = ValueKind::parse(kind_name)
        .ok_or_else(|| Error::SerializationError(format!("unknown value type '{}'", kind_name)))?;
    if kind == ValueKind::Null {
        return Ok(Value::Null);
    }
    let raw = el.require("Value")?;
    let invalid = || {
        Error::SerializationError(format!("invalid {} value '{}'", kind.as_str(), raw))
    };
    Ok(match kind {
        ValueKind::Null => Value::Null,
        ValueKind::Bool => Value::Bool(parse_bool(raw)?),
        ValueKind::Int => Value::Int(raw.parse().map_err(|_| invalid())?),
        ValueKind::Float => Value::Float(raw.parse().map_err(|_| invalid())?),
        ValueKind::String => Value::String(raw.to_string()),
        ValueKind::Bytes => Value::Bytes(STANDARD.decode(raw).map_err(|_| invalid())?),
    })
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(Error::SerializationError(format!(
            "invalid boolean '{}'",
            other
        ))),
    }
}

fn parse_num<T: std::str::FromStr>(el: &Element, key: &str) -> Result<T> {
    let raw = el.require(key)?;
    raw.parse().map_err(|_| {
        Error::SerializationError(format!(
            "attribute '{}' of <{}> is not a number: '{}'",
            key, el.name, raw
        ))
    })
}

fn parse_num_opt<T: std::str::FromStr>(el: &Element, key: &str) -> Result<Option<T>> {
    match el.get(key) {
        Some(_) => parse_num(el, key).map(Some),
        None => Ok(None),
    }
}

fn expect_name(el: &Element, name: &str) -> Result<()> {
    if el.name == name {
        Ok(())
    } else {
        Err(Error::SerializationError(format!(
            "expected <{}>, found <{}>",
            name, el.name
        )))
    }
}

fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_DECODE_DEPTH {
        return Err(Error::SerializationError(format!(
            "nesting deeper than {} levels",
            MAX_DECODE_DEPTH
        )));
    }
    Ok(())
}
