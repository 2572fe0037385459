//! `AccessControlPolicy` request bodies
//!
//! Parsing happens in two passes. The first builds an element tree and
//! rejects anything that is not well-formed XML (`MalformedXML`). The
//! second walks the tree against the ACL schema and rejects unexpected
//! shapes (`MalformedACLError`). Unknown group URIs are reported as
//! `MalformedXML`, matching what clients expect from this endpoint.

use crate::acl::{Permission, is_group_uri};
use crate::resolve::{Grantee, ParsedGrant};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tessera_common::{Error, Result};

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    fn count(&self, name: &str) -> usize {
        self.children.iter().filter(|c| c.name == name).count()
    }

    fn attr(&self, local_name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == local_name)
            .map(|(_, v)| v.as_str())
    }
}

fn malformed_xml(e: impl std::fmt::Display) -> Error {
    Error::MalformedXml(e.to_string())
}

fn malformed_acl(msg: impl Into<String>) -> Error {
    Error::MalformedAcl(msg.into())
}

fn open_element(e: &BytesStart<'_>) -> Result<Element> {
    let name = std::str::from_utf8(e.local_name().as_ref())
        .map_err(malformed_xml)?
        .to_string();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(malformed_xml)?;
        let key = std::str::from_utf8(attr.key.local_name().as_ref())
            .map_err(malformed_xml)?
            .to_string();
        let value = attr.unescape_value().map_err(malformed_xml)?.into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        ..Element::default()
    })
}

/// Build the element tree, failing `MalformedXML` on any structural error
fn parse_tree(body: &str) -> Result<Element> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().check_end_names = true;

    // Open elements with their raw (prefixed) names for end-tag matching
    let mut stack: Vec<(Vec<u8>, Element)> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event().map_err(malformed_xml)? {
            Event::Start(e) => {
                if root.is_some() {
                    return Err(malformed_xml("content after document element"));
                }
                stack.push((e.name().as_ref().to_vec(), open_element(&e)?));
            }
            Event::Empty(e) => {
                let element = open_element(&e)?;
                match stack.last_mut() {
                    Some((_, parent)) => parent.children.push(element),
                    None if root.is_none() => root = Some(element),
                    None => return Err(malformed_xml("content after document element")),
                }
            }
            Event::End(e) => {
                let (raw_name, element) = stack
                    .pop()
                    .ok_or_else(|| malformed_xml("unexpected closing tag"))?;
                if raw_name != e.name().as_ref() {
                    return Err(malformed_xml("mismatched closing tag"));
                }
                match stack.last_mut() {
                    Some((_, parent)) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(malformed_xml)?;
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                match stack.last_mut() {
                    Some((_, element)) => element.text.push_str(text),
                    None => return Err(malformed_xml("text outside document element")),
                }
            }
            Event::CData(e) => {
                let (_, element) = stack
                    .last_mut()
                    .ok_or_else(|| malformed_xml("CDATA outside document element"))?;
                element
                    .text
                    .push_str(std::str::from_utf8(&e).map_err(malformed_xml)?.trim());
            }
            Event::Eof => break,
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(malformed_xml("unclosed tag"));
    }
    root.ok_or_else(|| malformed_xml("empty document"))
}

fn parse_grantee(grantee: &Element) -> Result<Grantee> {
    let text_of = |name: &str| {
        grantee
            .child(name)
            .map(|c| c.text.clone())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| malformed_acl(format!("Grantee is missing {name}")))
    };

    match grantee.attr("type") {
        Some("CanonicalUser") => Ok(Grantee::CanonicalUser { id: text_of("ID")? }),
        Some("AmazonCustomerByEmail") => Ok(Grantee::Email {
            address: text_of("EmailAddress")?,
        }),
        Some("Group") => {
            let uri = text_of("URI")?;
            if !is_group_uri(&uri) {
                return Err(Error::MalformedXml(format!("invalid group uri: {uri}")));
            }
            Ok(Grantee::Group { uri })
        }
        Some(other) => Err(malformed_acl(format!("unknown grantee type: {other}"))),
        None => Err(malformed_acl("Grantee is missing xsi:type")),
    }
}

fn parse_grant(grant: &Element) -> Result<ParsedGrant> {
    if grant.count("Grantee") != 1 || grant.count("Permission") != 1 {
        return Err(malformed_acl("Grant needs one Grantee and one Permission"));
    }
    if let Some(other) = grant
        .children
        .iter()
        .find(|c| c.name != "Grantee" && c.name != "Permission")
    {
        return Err(malformed_acl(format!("unexpected element in Grant: {}", other.name)));
    }

    let grantee = grant
        .child("Grantee")
        .ok_or_else(|| malformed_acl("Grant is missing Grantee"))?;
    let permission = grant
        .child("Permission")
        .map(|p| p.text.as_str())
        .ok_or_else(|| malformed_acl("Grant is missing Permission"))?;
    let permission = Permission::from_wire(permission)
        .ok_or_else(|| malformed_acl(format!("unknown permission: {permission}")))?;

    Ok(ParsedGrant::new(parse_grantee(grantee)?, permission))
}

/// Parse an `AccessControlPolicy` document into unresolved grants
pub fn parse_access_control_policy(body: &[u8]) -> Result<Vec<ParsedGrant>> {
    let body = std::str::from_utf8(body).map_err(malformed_xml)?;
    let root = parse_tree(body)?;

    if root.name != "AccessControlPolicy" {
        return Err(malformed_acl(format!("unexpected root element: {}", root.name)));
    }
    for child in &root.children {
        match child.name.as_str() {
            "Owner" => {
                if child
                    .children
                    .iter()
                    .any(|c| c.name != "ID" && c.name != "DisplayName")
                {
                    return Err(malformed_acl("unexpected element in Owner"));
                }
            }
            "AccessControlList" => {}
            other => {
                return Err(malformed_acl(format!(
                    "unexpected element in AccessControlPolicy: {other}"
                )));
            }
        }
    }

    let list = root
        .child("AccessControlList")
        .ok_or_else(|| malformed_acl("missing AccessControlList"))?;
    list.children
        .iter()
        .map(|grant| {
            if grant.name == "Grant" {
                parse_grant(grant)
            } else {
                Err(malformed_acl(format!(
                    "unexpected element in AccessControlList: {}",
                    grant.name
                )))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::ALL_USERS;

    fn policy(acl: &str) -> String {
        format!(
            "<AccessControlPolicy xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
             <Owner><ID>852b113e7a2f25102679df27bb0ae12b3f85be6</ID>\
             <DisplayName>OwnerDisplayName</DisplayName></Owner>\
             <AccessControlList>{acl}</AccessControlList>\
             </AccessControlPolicy>"
        )
    }

    #[test]
    fn test_parse_all_grantee_kinds() {
        let body = policy(
            "<Grant><Grantee xsi:type=\"CanonicalUser\">\
               <ID>852b113e7a2f25102679df27bb0ae12b3f85be6</ID>\
               <DisplayName>OwnerDisplayName</DisplayName></Grantee>\
             <Permission>FULL_CONTROL</Permission></Grant>\
             <Grant><Grantee xsi:type=\"Group\">\
               <URI>http://acs.amazonaws.com/groups/global/AllUsers</URI></Grantee>\
             <Permission>READ</Permission></Grant>\
             <Grant><Grantee xsi:type=\"AmazonCustomerByEmail\">\
               <EmailAddress>sampleaccount1@sampling.com</EmailAddress></Grantee>\
             <Permission>WRITE_ACP</Permission></Grant>\
             <Grant><Grantee xsi:type=\"CanonicalUser\">\
               <ID>f30716ab7115dcb44a5ef76e9d74b8e20567f63</ID></Grantee>\
             <Permission>READ_ACP</Permission></Grant>",
        );
        let grants = parse_access_control_policy(body.as_bytes()).unwrap();
        assert_eq!(grants.len(), 4);
        assert_eq!(grants[0].permission, Permission::FullControl);
        assert_eq!(
            grants[1].grantee,
            Grantee::Group {
                uri: ALL_USERS.to_string()
            }
        );
        assert!(matches!(&grants[2].grantee, Grantee::Email { address } if address == "sampleaccount1@sampling.com"));
        assert_eq!(grants[3].permission, Permission::ReadAcp);
    }

    #[test]
    fn test_declared_xsi_namespace_is_accepted() {
        let body = "<AccessControlPolicy \
             xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
             <AccessControlList><Grant>\
             <Grantee xsi:type=\"CanonicalUser\"><ID>abc</ID></Grantee>\
             <Permission>READ</Permission></Grant></AccessControlList>\
             </AccessControlPolicy>";
        let grants = parse_access_control_policy(body.as_bytes()).unwrap();
        assert_eq!(grants.len(), 1);
    }

    #[test]
    fn test_unexpected_grant_tag_is_malformed_acl() {
        let body = policy(
            "<PowerGrant><Grantee xsi:type=\"AmazonCustomerByEmail\">\
               <EmailAddress>xyz@amazon.com</EmailAddress></Grantee>\
             <Permission>WRITE_ACP</Permission></PowerGrant>",
        );
        let err = parse_access_control_policy(body.as_bytes()).unwrap_err();
        assert_eq!(err.s3_error_code(), "MalformedACLError");
    }

    #[test]
    fn test_mismatched_grant_tags_is_malformed_xml() {
        let body = policy(
            "<Grant><Grantee xsi:type=\"AmazonCustomerByEmail\">\
               <EmailAddress>xyz@amazon.com</EmailAddress></Grantee>\
             <Permission>WRITE_ACP</Permission><Grant>",
        );
        let err = parse_access_control_policy(body.as_bytes()).unwrap_err();
        assert_eq!(err.s3_error_code(), "MalformedXML");
    }

    #[test]
    fn test_unclosed_document_is_malformed_xml() {
        let err = parse_access_control_policy(b"<AccessControlPolicy><AccessControlList>")
            .unwrap_err();
        assert!(matches!(err, Error::MalformedXml(_)));
        assert!(matches!(
            parse_access_control_policy(b"").unwrap_err(),
            Error::MalformedXml(_)
        ));
    }

    #[test]
    fn test_invalid_group_in_body_is_malformed_xml() {
        let body = policy(
            "<Grant><Grantee xsi:type=\"Group\">\
               <URI>http://acs.amazonaws.com/groups/global/NOTAVALIDGROUP</URI></Grantee>\
             <Permission>WRITE_ACP</Permission></Grant>",
        );
        let err = parse_access_control_policy(body.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedXml(_)));
    }

    #[test]
    fn test_schema_violations_are_malformed_acl() {
        let cases = [
            // unknown permission
            "<Grant><Grantee xsi:type=\"CanonicalUser\"><ID>a</ID></Grantee>\
             <Permission>EVERYTHING</Permission></Grant>",
            // missing permission
            "<Grant><Grantee xsi:type=\"CanonicalUser\"><ID>a</ID></Grantee></Grant>",
            // unknown grantee type
            "<Grant><Grantee xsi:type=\"Robot\"><ID>a</ID></Grantee>\
             <Permission>READ</Permission></Grant>",
            // grantee without its identifier
            "<Grant><Grantee xsi:type=\"CanonicalUser\"></Grantee>\
             <Permission>READ</Permission></Grant>",
        ];
        for acl in cases {
            let err = parse_access_control_policy(policy(acl).as_bytes()).unwrap_err();
            assert!(matches!(err, Error::MalformedAcl(_)), "{acl}: {err:?}");
        }

        let err = parse_access_control_policy(b"<Policy></Policy>").unwrap_err();
        assert!(matches!(err, Error::MalformedAcl(_)));
    }

    #[test]
    fn test_write_grant_is_parsed() {
        let body = policy(
            "<Grant><Grantee xsi:type=\"Group\">\
               <URI>http://acs.amazonaws.com/groups/global/AllUsers</URI></Grantee>\
             <Permission>WRITE</Permission></Grant>",
        );
        let grants = parse_access_control_policy(body.as_bytes()).unwrap();
        assert_eq!(grants[0].permission, Permission::Write);
    }
}
