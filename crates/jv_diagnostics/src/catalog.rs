/// 診断コードと補修ガイダンスをまとめたディスクリプタ。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticDescriptor {
    pub code: &'static str,
    pub title: &'static str,
    pub help: &'static str,
}

/// 安定した診断コード。値は公開契約の一部なので変更しないこと。
pub mod codes {
    pub const ENTRY_UNREADABLE: &str = "JV5100";
    pub const MEMBER_SKIPPED: &str = "JV5101";
    pub const UNREADABLE_SYMBOL: &str = "JV5102";
    pub const RELEASE_MISMATCH: &str = "JV5103";
    pub const SCOPE_VIOLATION: &str = "JV5110";
    pub const ISOLATION_CONFLICT: &str = "JV5200";
    pub const SYMBOL_NOT_FOUND: &str = "JV5300";
    pub const INVALID_TARGET: &str = "JV5301";
    pub const NUMERIC_CONVERSION: &str = "JV5302";
    pub const GENERIC_CONVERSION: &str = "JV5303";
    pub const AMBIGUOUS_OVERLOAD: &str = "JV5304";
    pub const NO_APPLICABLE_OVERLOAD: &str = "JV5305";
    pub const INVOCATION_FAILED: &str = "JV5306";
    pub const POLICY_CONFLICT: &str = "JV5400";
    pub const STRICT_UNDECLARED: &str = "JV5401";
    pub const RISK_NOT_ACKNOWLEDGED: &str = "JV5402";
    pub const DENYLISTED: &str = "JV5403";
    pub const RBAC_DENIED: &str = "JV5404";
    pub const APPROVAL_REQUIRED: &str = "JV5405";
    pub const AUDIT_AGGREGATE_FALLBACK: &str = "JV5406";
    pub const AUDIT_UNWRITABLE: &str = "JV5407";
    pub const INVALID_POLICY: &str = "JV5408";
    pub const INVALID_CONFIG: &str = "JV5500";
    pub const OUTPUT_UNWRITABLE: &str = "JV5501";
}

pub const DESCRIPTORS: &[DiagnosticDescriptor] = &[
    DiagnosticDescriptor {
        code: codes::ENTRY_UNREADABLE,
        title: "classpath entry could not be read",
        help: "Check that the entry exists and is a readable directory, jar, jmod or jrt module reference.",
    },
    DiagnosticDescriptor {
        code: codes::MEMBER_SKIPPED,
        title: "class member skipped while indexing",
        help: "The member is malformed. It only becomes fatal when a call target needs it.",
    },
    DiagnosticDescriptor {
        code: codes::UNREADABLE_SYMBOL,
        title: "call target requires an unreadable class",
        help: "Rebuild or replace the archive that carries the malformed class file.",
    },
    DiagnosticDescriptor {
        code: codes::RELEASE_MISMATCH,
        title: "multi-release archive has no variant for the target release",
        help: "Raise the target release or supply an archive with a base entry.",
    },
    DiagnosticDescriptor {
        code: codes::SCOPE_VIOLATION,
        title: "class is only reachable through an excluded dependency scope",
        help: "Move the dependency to compile/runtime scope or run with a compatible classpath scope.",
    },
    DiagnosticDescriptor {
        code: codes::ISOLATION_CONFLICT,
        title: "program class collides with a library class",
        help: "Rename the program class or switch classloader isolation to `shared`.",
    },
    DiagnosticDescriptor {
        code: codes::SYMBOL_NOT_FOUND,
        title: "interop target class was not found",
        help: "Add the archive that defines the class to the classpath.",
    },
    DiagnosticDescriptor {
        code: codes::INVALID_TARGET,
        title: "interop target is not callable with the requested binding",
        help: "Only public members are bridged, and static bindings require static members.",
    },
    DiagnosticDescriptor {
        code: codes::NUMERIC_CONVERSION,
        title: "numeric argument requires narrowing",
        help: "Pass a value that widens to the parameter type or convert it explicitly.",
    },
    DiagnosticDescriptor {
        code: codes::GENERIC_CONVERSION,
        title: "generic interop conversion failed",
        help: "Check element types and enum constant names of structured arguments.",
    },
    DiagnosticDescriptor {
        code: codes::AMBIGUOUS_OVERLOAD,
        title: "ambiguous overload",
        help: "Several overloads are equally applicable. Make the argument types explicit.",
    },
    DiagnosticDescriptor {
        code: codes::NO_APPLICABLE_OVERLOAD,
        title: "no applicable overload",
        help: "No overload accepts the supplied arguments.",
    },
    DiagnosticDescriptor {
        code: codes::INVOCATION_FAILED,
        title: "interop invocation failed",
        help: "The host runtime rejected the call.",
    },
    DiagnosticDescriptor {
        code: codes::POLICY_CONFLICT,
        title: "project and global interop policies conflict",
        help: "Pass the setting explicitly on the command line to disambiguate.",
    },
    DiagnosticDescriptor {
        code: codes::STRICT_UNDECLARED,
        title: "strict interop policy requires a declared target",
        help: "Declare the target in the interop allowlist or switch to the broad policy.",
    },
    DiagnosticDescriptor {
        code: codes::RISK_NOT_ACKNOWLEDGED,
        title: "broad interop policy requires risk acknowledgement",
        help: "Set `interop.ackRisk=true` or pass `--ack-interop-risk`.",
    },
    DiagnosticDescriptor {
        code: codes::DENYLISTED,
        title: "interop target is denylisted",
        help: "Remove the target from the call manifest or from the denylist.",
    },
    DiagnosticDescriptor {
        code: codes::RBAC_DENIED,
        title: "interop call denied by RBAC",
        help: "Run with one of the required roles.",
    },
    DiagnosticDescriptor {
        code: codes::APPROVAL_REQUIRED,
        title: "interop call requires approval",
        help: "Provide the approval token configured for the sensitive target.",
    },
    DiagnosticDescriptor {
        code: codes::AUDIT_AGGREGATE_FALLBACK,
        title: "centralized audit sink unavailable",
        help: "The decision was recorded in the local audit log only.",
    },
    DiagnosticDescriptor {
        code: codes::AUDIT_UNWRITABLE,
        title: "interop audit log could not be written",
        help: "Check permissions of the audit log path.",
    },
    DiagnosticDescriptor {
        code: codes::INVALID_POLICY,
        title: "interop policy file is invalid",
        help: "Fix the reported key or value in the policy file.",
    },
    DiagnosticDescriptor {
        code: codes::INVALID_CONFIG,
        title: "interop run configuration is invalid",
        help: "Fix the reported setting in the interop configuration.",
    },
    DiagnosticDescriptor {
        code: codes::OUTPUT_UNWRITABLE,
        title: "interop run outputs could not be written",
        help: "Check that the output directory is writable.",
    },
];

/// 診断コードに対応するディスクリプタを取得します。
pub fn descriptor(code: &str) -> Option<&'static DiagnosticDescriptor> {
    DESCRIPTORS.iter().find(|desc| desc.code == code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_unique() {
        let mut seen = HashSet::new();
        for desc in DESCRIPTORS {
            assert!(seen.insert(desc.code), "duplicate code {}", desc.code);
        }
    }

    #[test]
    fn lookup_finds_scope_violation() {
        let desc = descriptor(codes::SCOPE_VIOLATION).expect("descriptor");
        assert!(desc.help.contains("compile/runtime scope"));
        assert!(descriptor("JV0000").is_none());
    }
}
