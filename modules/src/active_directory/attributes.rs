//! Active Directory attribute parsing and account checks

use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use upstream_core::directory::Entry;
use upstream_core::provider::{AttributeParser, RefreshAttributes, RefreshCheck};
use upstream_core::{Error, Result};
use uuid::Uuid;

pub const SAM_ACCOUNT_NAME_ATTRIBUTE: &str = "sAMAccountName";
pub const USER_ACCOUNT_CONTROL_ATTRIBUTE: &str = "userAccountControl";
pub const USER_ACCOUNT_CONTROL_COMPUTED_ATTRIBUTE: &str = "msDS-User-Account-Control-Computed";
pub const PWD_LAST_SET_ATTRIBUTE: &str = "pwdLastSet";

/// ACCOUNTDISABLE bit of userAccountControl
const ACCOUNT_DISABLED_FLAG: i64 = 0x2;
/// UF_LOCKOUT bit of msDS-User-Account-Control-Computed
const ACCOUNT_LOCKED_FLAG: i64 = 0x10;

lazy_static! {
    static ref DOMAIN_COMPONENT: Regex =
        Regex::new(r"(?i)^dc=(.+)$").expect("domain component pattern is valid");
}

/// Format a binary objectGUID the way Active Directory displays it.
///
/// The first three groups are stored little-endian.
pub fn microsoft_uuid_from_binary(binary: &[u8]) -> Result<String> {
    Uuid::from_slice_le(binary)
        .map(|uuid| uuid.hyphenated().to_string())
        .map_err(|_| Error::InvalidAttribute(format!("invalid UUID (got {} bytes)", binary.len())))
}

/// Parser that formats the named binary attribute as a Microsoft GUID
pub fn microsoft_uuid_from_binary_attr(attribute: &str) -> AttributeParser {
    let attribute = attribute.to_string();
    Arc::new(move |entry: &Entry| {
        let binary = entry
            .raw_values(&attribute)
            .first()
            .map(Vec::as_slice)
            .unwrap_or_default();
        microsoft_uuid_from_binary(binary)
    })
}

/// Dotted domain name built from the DC components of a DN
pub fn domain_from_distinguished_name(distinguished_name: &str) -> Result<String> {
    let components: Vec<&str> = distinguished_name
        .split(',')
        .filter_map(|component| DOMAIN_COMPONENT.captures(component))
        .filter_map(|captures| captures.get(1))
        .map(|value| value.as_str())
        .collect();

    if components.is_empty() {
        return Err(Error::InvalidAttribute(format!(
            "did not find domain components in group dn: {}",
            distinguished_name
        )));
    }
    Ok(components.join("."))
}

/// Group name as `sAMAccountName@domain`
pub fn group_sam_account_name_with_domain_suffix(entry: &Entry) -> Result<String> {
    let values = entry.values(SAM_ACCOUNT_NAME_ATTRIBUTE);
    if values.len() != 1 {
        return Err(Error::InvalidAttribute(format!(
            "found {} values for attribute {:?}, but expected 1 result",
            values.len(),
            SAM_ACCOUNT_NAME_ATTRIBUTE
        )));
    }
    let sam_account_name = &values[0];
    if sam_account_name.is_empty() {
        return Err(Error::InvalidAttribute(format!(
            "found empty value for attribute {:?}, but expected value to be non-empty",
            SAM_ACCOUNT_NAME_ATTRIBUTE
        )));
    }

    let domain = domain_from_distinguished_name(&entry.dn)?;
    Ok(format!("{}@{}", sam_account_name, domain))
}

fn account_control_flags(entry: &Entry, attribute: &str) -> Result<i64> {
    entry
        .first_value(attribute)
        .parse::<i64>()
        .map_err(|e| Error::InvalidAttribute(e.to_string()))
}

/// Refresh check failing for disabled accounts
pub fn valid_user_account_control(entry: &Entry, _stored: &RefreshAttributes) -> Result<()> {
    let flags = account_control_flags(entry, USER_ACCOUNT_CONTROL_ATTRIBUTE)?;
    if flags & ACCOUNT_DISABLED_FLAG != 0 {
        return Err(Error::InvalidAttribute("user has been deactivated".to_string()));
    }
    Ok(())
}

/// Refresh check failing for locked accounts
pub fn valid_computed_user_account_control(
    entry: &Entry,
    _stored: &RefreshAttributes,
) -> Result<()> {
    let flags = account_control_flags(entry, USER_ACCOUNT_CONTROL_COMPUTED_ATTRIBUTE)?;
    if flags & ACCOUNT_LOCKED_FLAG != 0 {
        return Err(Error::InvalidAttribute("user has been locked".to_string()));
    }
    Ok(())
}

pub fn group_sam_account_name_parser() -> AttributeParser {
    Arc::new(group_sam_account_name_with_domain_suffix)
}

pub fn user_account_control_check() -> RefreshCheck {
    Arc::new(valid_user_account_control)
}

pub fn computed_user_account_control_check() -> RefreshCheck {
    Arc::new(valid_computed_user_account_control)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BINARY_GUID: [u8; 16] = [
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15,
        0x16,
    ];

    #[test]
    fn test_microsoft_uuid_from_binary() {
        assert_eq!(
            microsoft_uuid_from_binary(&BINARY_GUID).unwrap(),
            "04030201-0605-0807-0910-111213141516"
        );

        let err = microsoft_uuid_from_binary(&BINARY_GUID[..15]).unwrap_err();
        assert_eq!(err.to_string(), "invalid UUID (got 15 bytes)");

        let err = microsoft_uuid_from_binary(&[]).unwrap_err();
        assert_eq!(err.to_string(), "invalid UUID (got 0 bytes)");
    }

    #[test]
    fn test_microsoft_uuid_from_binary_attr() {
        let parser = microsoft_uuid_from_binary_attr("objectGUID");
        let entry = Entry::new("cn=pinny").with_attribute("objectGUID", vec![BINARY_GUID.to_vec()]);
        assert_eq!(parser(&entry).unwrap(), "04030201-0605-0807-0910-111213141516");

        let missing = Entry::new("cn=pinny");
        assert_eq!(
            parser(&missing).unwrap_err().to_string(),
            "invalid UUID (got 0 bytes)"
        );
    }

    #[test]
    fn test_domain_from_distinguished_name() {
        let cases = [
            (
                "cn=mammals,ou=groups,dc=activedirectory,dc=mycompany,dc=example,dc=com",
                Ok("activedirectory.mycompany.example.com"),
            ),
            ("CN=Mammals,OU=Groups,DC=Example,DC=Com", Ok("Example.Com")),
            (
                "cn=no-domain,ou=groups",
                Err("did not find domain components in group dn: cn=no-domain,ou=groups"),
            ),
            ("", Err("did not find domain components in group dn: ")),
        ];

        for (dn, expected) in cases {
            let result = domain_from_distinguished_name(dn).map_err(|e| e.to_string());
            assert_eq!(
                result.as_deref().map_err(String::as_str),
                expected,
                "dn: {}",
                dn
            );
        }
    }

    #[test]
    fn test_group_sam_account_name_with_domain_suffix() {
        let entry = Entry::new("CN=Mammals,OU=Groups,DC=Activedirectory,DC=Example,DC=Com")
            .with_attribute(SAM_ACCOUNT_NAME_ATTRIBUTE, vec!["Mammals"]);
        assert_eq!(
            group_sam_account_name_with_domain_suffix(&entry).unwrap(),
            "Mammals@Activedirectory.Example.Com"
        );

        let two =
            Entry::new("dc=example").with_attribute(SAM_ACCOUNT_NAME_ATTRIBUTE, vec!["a", "b"]);
        assert_eq!(
            group_sam_account_name_with_domain_suffix(&two)
                .unwrap_err()
                .to_string(),
            "found 2 values for attribute \"sAMAccountName\", but expected 1 result"
        );

        let none = Entry::new("dc=example");
        assert_eq!(
            group_sam_account_name_with_domain_suffix(&none)
                .unwrap_err()
                .to_string(),
            "found 0 values for attribute \"sAMAccountName\", but expected 1 result"
        );

        let no_domain =
            Entry::new("cn=mammals").with_attribute(SAM_ACCOUNT_NAME_ATTRIBUTE, vec!["Mammals"]);
        assert_eq!(
            group_sam_account_name_with_domain_suffix(&no_domain)
                .unwrap_err()
                .to_string(),
            "did not find domain components in group dn: cn=mammals"
        );
    }

    #[test]
    fn test_user_account_control() {
        let stored = RefreshAttributes::default();
        let cases = [
            ("512", None),
            ("514", Some("user has been deactivated")),
            ("2", Some("user has been deactivated")),
            ("66048", None),
        ];
        for (value, expected) in cases {
            let entry =
                Entry::new("cn=pinny").with_attribute(USER_ACCOUNT_CONTROL_ATTRIBUTE, vec![value]);
            let err = valid_user_account_control(&entry, &stored)
                .err()
                .map(|e| e.to_string());
            assert_eq!(err.as_deref(), expected, "value: {}", value);
        }

        let invalid =
            Entry::new("cn=pinny").with_attribute(USER_ACCOUNT_CONTROL_ATTRIBUTE, vec!["abc"]);
        assert_eq!(
            valid_user_account_control(&invalid, &stored)
                .unwrap_err()
                .to_string(),
            "invalid digit found in string"
        );
        assert!(valid_user_account_control(&Entry::new("cn=pinny"), &stored).is_err());
    }

    #[test]
    fn test_computed_user_account_control() {
        let stored = RefreshAttributes::default();
        let locked = Entry::new("cn=pinny")
            .with_attribute(USER_ACCOUNT_CONTROL_COMPUTED_ATTRIBUTE, vec!["16"]);
        assert_eq!(
            valid_computed_user_account_control(&locked, &stored)
                .unwrap_err()
                .to_string(),
            "user has been locked"
        );

        let fine = Entry::new("cn=pinny")
            .with_attribute(USER_ACCOUNT_CONTROL_COMPUTED_ATTRIBUTE, vec!["0"]);
        assert!(valid_computed_user_account_control(&fine, &stored).is_ok());

        let check = computed_user_account_control_check();
        assert!(check(&fine, &stored).is_ok());
    }
}
