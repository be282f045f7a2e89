pub mod quoted_u8_var_list {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use ssz_types::{VariableList, typenum::Unsigned};

    pub fn serialize<S, N>(value: &VariableList<u8, N>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        N: Unsigned,
    {
        let string_vec: Vec<String> = value.iter().map(|v| v.to_string()).collect();
        string_vec.serialize(serializer)
    }

    pub fn deserialize<'de, D, N>(deserializer: D) -> Result<VariableList<u8, N>, D::Error>
    where
        D: Deserializer<'de>,
        N: Unsigned,
    {
        let string_vec: Vec<String> = Vec::deserialize(deserializer)?;
        let bytes = string_vec
            .into_iter()
            .map(|s| s.parse::<u8>().map_err(serde::de::Error::custom))
            .collect::<Result<Vec<_>, _>>()?;
        VariableList::new(bytes).map_err(|err| {
            serde::de::Error::custom(format!("Cannot create VariableList from bytes: {err:?}"))
        })
    }
}
