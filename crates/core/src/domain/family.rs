use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

const MAX_NAME_LEN: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FamilyMember {
    pub phone: String,
    pub name: String,
    /// Signal account UUID, for senders that hide their number.
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Debug, Error)]
pub enum WhitelistError {
    #[error("could not read family members file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse family members file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("family whitelist must contain at least one member")]
    Empty,
    #[error("invalid family member entry: {0}")]
    InvalidMember(String),
}

#[derive(Debug, Default, Deserialize)]
struct MembersFile {
    #[serde(default)]
    members: Vec<FamilyMember>,
}

/// Static allow-list of family members, loaded once at startup.
#[derive(Clone, Debug)]
pub struct FamilyWhitelist {
    members: Vec<FamilyMember>,
}

impl FamilyWhitelist {
    pub fn new(members: Vec<FamilyMember>) -> Result<Self, WhitelistError> {
        if members.is_empty() {
            return Err(WhitelistError::Empty);
        }

        for member in &members {
            validate_member(member)?;
        }

        Ok(Self { members })
    }

    pub fn load(path: &Path) -> Result<Self, WhitelistError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| WhitelistError::ReadFile { path: path.to_path_buf(), source })?;
        Self::parse(&raw, path)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, WhitelistError> {
        Self::parse(raw, Path::new("<inline>"))
    }

    fn parse(raw: &str, path: &Path) -> Result<Self, WhitelistError> {
        let file = toml::from_str::<MembersFile>(raw)
            .map_err(|source| WhitelistError::ParseFile { path: path.to_path_buf(), source })?;
        Self::new(file.members)
    }

    pub fn is_allowed(&self, identifier: &str) -> bool {
        self.lookup(identifier).is_some()
    }

    pub fn display_name(&self, identifier: &str) -> Option<&str> {
        self.lookup(identifier).map(|member| member.name.as_str())
    }

    pub fn members(&self) -> &[FamilyMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn lookup(&self, identifier: &str) -> Option<&FamilyMember> {
        let identifier = identifier.trim();
        self.members.iter().find(|member| {
            member.phone == identifier || member.uuid.as_deref() == Some(identifier)
        })
    }
}

fn validate_member(member: &FamilyMember) -> Result<(), WhitelistError> {
    if !is_e164(&member.phone) {
        return Err(WhitelistError::InvalidMember(format!(
            "phone `{}` must be in E.164 format (e.g. +4915112345678)",
            member.phone
        )));
    }

    let name_len = member.name.trim().chars().count();
    if name_len == 0 || name_len > MAX_NAME_LEN {
        return Err(WhitelistError::InvalidMember(format!(
            "name for `{}` must be 1..={MAX_NAME_LEN} characters",
            member.phone
        )));
    }

    Ok(())
}

pub fn is_e164(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('+') else {
        return false;
    };
    (2..=15).contains(&digits.len())
        && digits.chars().all(|ch| ch.is_ascii_digit())
        && !digits.starts_with('0')
}
