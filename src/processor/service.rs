/// Service name used when a port has no entry in the table.
pub const OTHER_SERVICE: &str = "other";

/// Maps a destination port to its KDD service name.
pub fn service_for_port(port: u16) -> &'static str {
    match port {
        20 => "ftp_data",
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "domain",
        67 | 68 => "domain_u",
        69 => "tftp_u",
        70 => "gopher",
        79 => "finger",
        80 => "http",
        88 => "kerberos",
        109 => "pop_2",
        110 => "pop_3",
        113 => "auth",
        119 => "nntp",
        123 => "ntp_u",
        137 => "netbios_ns",
        138 => "netbios_dgm",
        139 => "netbios_ssn",
        143 => "imap4",
        161 | 162 => "snmp",
        179 => "bgp",
        389 => "ldap",
        443 => "http_443",
        445 => "microsoft-ds",
        465 => "smtps",
        514 => "shell",
        520 => "efs",
        543 => "klogin",
        544 => "kshell",
        993 => "imaps",
        995 => "pop3s",
        1433 => "sql_net",
        3306 => "mysql",
        5432 => "postgresql",
        6667 => "IRC",
        8001 => "http_8001",
        8080 => "http_proxy",
        8443 => "https_proxy",
        _ => OTHER_SERVICE,
    }
}
